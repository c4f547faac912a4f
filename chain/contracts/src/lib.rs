//! Custody vaults, vault registry and exchange router
//!
//! This crate implements the custody-and-routing engine that lets a holder of
//! a whitelisted asset swap it for the native settlement asset in a single
//! operation, drawing on reserves held in registry-created vaults.
//!
//! # Modules
//! - `host`: Execution environment (clock, token ledgers, native balances, event log)
//! - `whitelist`: Eligible assets, batch add, cached pagination
//! - `vault`: Per-depositor custody, router pushes, pause, emergency recovery
//! - `registry`: Vault creation, best-fit search, reserve rebalancing, batch admin
//! - `pricing`: Price feeds, scaling factors, settlement conversion
//! - `rate_limit`: Per-period swap counter
//! - `router`: Exchange orchestration and payment-asset administration
//! - `approval`: Ed25519 signed approvals
//! - `chain`: Composition root with all-or-nothing transactions
//! - `config`, `events`, `errors`, `security`: Shared plumbing
//!
//! # Version
//! v0.1.0

pub mod approval;
pub mod chain;
pub mod config;
pub mod errors;
pub mod events;
pub mod host;
pub mod pricing;
pub mod rate_limit;
pub mod registry;
pub mod router;
pub mod security;
pub mod vault;
pub mod whitelist;

/// Contract ABI version, frozen after release
pub const CONTRACT_ABI_VERSION: &str = "1.0.0";
