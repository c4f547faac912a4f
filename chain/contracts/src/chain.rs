//! Composition root: the assembled whitelist, registry, router and host
//!
//! Every state-changing entry point runs inside [`Chain::transact`], which
//! snapshots the whole state and restores it if the operation fails. An
//! operation therefore either commits all of its effects (events included)
//! or none of them.

use ed25519_dalek::VerifyingKey;
use std::sync::Arc;
use tracing::{debug, info};
use types::ids::Address;
use types::numeric::Amount;

use crate::approval::{Permit, PermitBook};
use crate::config::ChainConfig;
use crate::errors::ChainError;
use crate::host::Host;
use crate::pricing::PriceFeed;
use crate::registry::{BatchOutcome, RebalanceReport, VaultRegistry, VaultTemplate};
use crate::router::{ExchangeContext, ExchangeReceipt, ExchangeRouter};
use crate::whitelist::AssetWhitelist;

/// Version stamped on vaults created from the genesis template.
pub const GENESIS_TEMPLATE_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct Chain {
    host: Host,
    whitelist: AssetWhitelist,
    registry: VaultRegistry,
    router: ExchangeRouter,
    permits: PermitBook,
}

impl Chain {
    /// Assemble the components described by `config`.
    pub fn new(config: ChainConfig) -> Result<Self, ChainError> {
        config.validate()?;
        let mut host = Host::new(config.genesis_height, config.genesis_timestamp);

        let whitelist_addr = Address::derive(b"component:whitelist");
        let registry_addr = Address::derive(b"component:registry");
        let router_addr = Address::derive(b"component:router");
        for address in [whitelist_addr, registry_addr, router_addr] {
            host.register_code(address);
        }

        let whitelist = AssetWhitelist::new(whitelist_addr, config.whitelist_owner, config.whitelist.clone());
        let mut registry = VaultRegistry::new(registry_addr, config.registry_admin, whitelist_addr);
        registry.set_implementation(
            config.registry_admin,
            VaultTemplate {
                version: GENESIS_TEMPLATE_VERSION,
                default_router: Some(router_addr),
            },
        )?;
        let router = ExchangeRouter::new(
            router_addr,
            config.router_owner,
            config.reserve_owner,
            config.router.clone(),
        );

        info!(
            whitelist = %whitelist_addr.short(),
            registry = %registry_addr.short(),
            router = %router_addr.short(),
            height = config.genesis_height,
            "Chain assembled"
        );
        Ok(Self {
            host,
            whitelist,
            registry,
            router,
            permits: PermitBook::new(router_addr),
        })
    }

    /// Run `op` atomically: on error every change it made is discarded.
    ///
    /// The event log is append-only, so it is left out of the snapshot and
    /// truncated back to its length on revert.
    pub fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut Chain) -> Result<T, ChainError>,
    ) -> Result<T, ChainError> {
        let log = self.host.take_log();
        let mark = log.len();
        let snapshot = self.clone();
        self.host.restore_log(log);

        let result = op(self);
        if let Err(e) = &result {
            debug!(reason = %e, "Operation reverted");
            let mut log = self.host.take_log();
            log.truncate(mark);
            *self = snapshot;
            self.host.restore_log(log);
        }
        result
    }

    // ───────────────────────── Accessors ─────────────────────────

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Direct host access for environment setup (minting, funding, clock).
    pub fn host_mut(&mut self) -> &mut Host {
        &mut self.host
    }

    pub fn whitelist(&self) -> &AssetWhitelist {
        &self.whitelist
    }

    pub fn registry(&self) -> &VaultRegistry {
        &self.registry
    }

    pub fn router(&self) -> &ExchangeRouter {
        &self.router
    }

    pub fn permits(&self) -> &PermitBook {
        &self.permits
    }

    /// Move the clock forward.
    pub fn advance(&mut self, blocks: u64, seconds: u64) {
        self.host.advance(blocks, seconds);
    }

    // ───────────────────────── Whitelist ─────────────────────────

    pub fn add_asset(&mut self, caller: Address, asset: Address) -> Result<(), ChainError> {
        self.transact(|c| Ok(c.whitelist.add(caller, asset, &mut c.host)?))
    }

    pub fn remove_asset(&mut self, caller: Address, asset: Address) -> Result<(), ChainError> {
        self.transact(|c| Ok(c.whitelist.remove(caller, asset, &mut c.host)?))
    }

    pub fn add_assets(&mut self, caller: Address, assets: &[Address]) -> Result<usize, ChainError> {
        self.transact(|c| Ok(c.whitelist.add_batch(caller, assets, &mut c.host)?))
    }

    pub fn list_assets(&self, offset: usize, limit: usize) -> Result<Vec<Address>, ChainError> {
        Ok(self.whitelist.page(offset, limit)?)
    }

    /// Cached listing, aged against the host clock.
    pub fn list_assets_cached(&mut self, offset: usize, limit: usize) -> Result<Vec<Address>, ChainError> {
        let now = self.host.timestamp();
        Ok(self.whitelist.page_cached(offset, limit, now)?)
    }

    pub fn invalidate_asset_cache(&mut self) {
        self.whitelist.invalidate_cache();
    }

    // ───────────────────────── Vaults ─────────────────────────

    pub fn create_vault(&mut self, caller: Address, owner: Address) -> Result<Address, ChainError> {
        self.transact(|c| Ok(c.registry.create_vault(caller, owner, &mut c.host)?))
    }

    pub fn deposit(&mut self, caller: Address, vault: Address, asset: Address, amount: Amount) -> Result<Amount, ChainError> {
        self.transact(|c| {
            let v = c.registry.vault_mut(vault)?;
            Ok(v.deposit_asset(caller, asset, amount, &c.whitelist, &mut c.host)?)
        })
    }

    pub fn withdraw(
        &mut self,
        caller: Address,
        vault: Address,
        asset: Address,
        amount: Amount,
        to: Address,
    ) -> Result<(), ChainError> {
        self.transact(|c| {
            let v = c.registry.vault_mut(vault)?;
            Ok(v.withdraw(caller, asset, amount, to, &mut c.host)?)
        })
    }

    pub fn pause_vault(&mut self, caller: Address, vault: Address) -> Result<(), ChainError> {
        self.transact(|c| Ok(c.registry.vault_mut(vault)?.pause(caller, &mut c.host)?))
    }

    pub fn unpause_vault(&mut self, caller: Address, vault: Address) -> Result<(), ChainError> {
        self.transact(|c| Ok(c.registry.vault_mut(vault)?.unpause(caller, &mut c.host)?))
    }

    pub fn emergency_recover(
        &mut self,
        caller: Address,
        vault: Address,
        asset: Address,
        amount: Amount,
        to: Address,
    ) -> Result<(), ChainError> {
        self.transact(|c| {
            let v = c.registry.vault_mut(vault)?;
            Ok(v.emergency_recover(caller, asset, amount, to, &mut c.host)?)
        })
    }

    pub fn set_vault_router(&mut self, caller: Address, vault: Address, router: Address) -> Result<(), ChainError> {
        self.transact(|c| Ok(c.registry.vault_mut(vault)?.set_router(caller, router)?))
    }

    pub fn transfer_vault_ownership(
        &mut self,
        caller: Address,
        vault: Address,
        new_owner: Address,
    ) -> Result<(), ChainError> {
        self.transact(|c| Ok(c.registry.transfer_vault_ownership(caller, vault, new_owner, &mut c.host)?))
    }

    pub fn retire_vault(&mut self, caller: Address, vault: Address) -> Result<(), ChainError> {
        self.transact(|c| Ok(c.registry.retire_vault(caller, vault, &mut c.host)?))
    }

    // ───────────────────────── Registry administration ─────────────────────────

    pub fn set_implementation(&mut self, caller: Address, template: VaultTemplate) -> Result<(), ChainError> {
        self.transact(|c| Ok(c.registry.set_implementation(caller, template)?))
    }

    pub fn find_best_vault(&self, required: Amount) -> Result<Address, ChainError> {
        Ok(self
            .registry
            .find_best_vault(self.router.reserve_owner(), required, &self.host)?)
    }

    pub fn rebalance(
        &mut self,
        caller: Address,
        sources: &[Address],
        targets: &[Address],
        target_balances: &[Amount],
    ) -> Result<RebalanceReport, ChainError> {
        self.transact(|c| Ok(c.registry.rebalance(caller, sources, targets, target_balances, &mut c.host)?))
    }

    pub fn auto_rebalance(
        &mut self,
        caller: Address,
        lower: Amount,
        target: Amount,
        upper: Amount,
    ) -> Result<RebalanceReport, ChainError> {
        self.transact(|c| Ok(c.registry.auto_rebalance(caller, lower, target, upper, &mut c.host)?))
    }

    pub fn batch_transfer_ownership(
        &mut self,
        caller: Address,
        moves: &[(Address, Address)],
    ) -> Result<BatchOutcome, ChainError> {
        self.transact(|c| Ok(c.registry.batch_transfer_ownership(caller, moves, &mut c.host)?))
    }

    pub fn batch_set_whitelist(
        &mut self,
        caller: Address,
        vaults: &[Address],
        whitelist: Address,
    ) -> Result<BatchOutcome, ChainError> {
        self.transact(|c| Ok(c.registry.batch_set_whitelist(caller, vaults, whitelist)?))
    }

    pub fn batch_set_router(
        &mut self,
        caller: Address,
        vaults: &[Address],
        router: Address,
    ) -> Result<BatchOutcome, ChainError> {
        self.transact(|c| Ok(c.registry.batch_set_router(caller, vaults, router)?))
    }

    // ───────────────────────── Router ─────────────────────────

    pub fn add_payment_asset(
        &mut self,
        caller: Address,
        asset: Address,
        feed: Arc<dyn PriceFeed>,
    ) -> Result<Amount, ChainError> {
        self.transact(|c| Ok(c.router.add_payment_asset(caller, asset, feed, &c.whitelist, &mut c.host)?))
    }

    pub fn remove_payment_asset(&mut self, caller: Address, asset: Address) -> Result<(), ChainError> {
        self.transact(|c| Ok(c.router.remove_payment_asset(caller, asset, &mut c.host)?))
    }

    pub fn set_default_asset(&mut self, caller: Address, asset: Address) -> Result<(), ChainError> {
        self.transact(|c| Ok(c.router.set_default_asset(caller, asset, &mut c.host)?))
    }

    pub fn set_deposit_bounds(&mut self, caller: Address, minimum: Amount, maximum: Amount) -> Result<(), ChainError> {
        self.transact(|c| Ok(c.router.set_deposit_bounds(caller, minimum, maximum)?))
    }

    pub fn refresh_asset_decimals(&mut self, caller: Address, asset: Address) -> Result<bool, ChainError> {
        self.transact(|c| Ok(c.router.refresh_asset_decimals(caller, asset, &mut c.host)?))
    }

    pub fn quote(&self, asset: Option<Address>, amount: Amount) -> Result<Amount, ChainError> {
        Ok(self.router.quote(asset, amount, &self.host)?)
    }

    pub fn exchange(
        &mut self,
        caller: Address,
        asset: Option<Address>,
        amount: Amount,
        destination: Option<Address>,
    ) -> Result<ExchangeReceipt, ChainError> {
        self.transact(|c| {
            let mut ctx = ExchangeContext {
                registry: &mut c.registry,
                whitelist: &c.whitelist,
                host: &mut c.host,
            };
            Ok(c.router.exchange(caller, asset, amount, destination, &mut ctx)?)
        })
    }

    /// Exchange authorised by a signed approval, submitted by `relayer`.
    pub fn exchange_with_permit(
        &mut self,
        relayer: Address,
        asset: Option<Address>,
        permit: &Permit,
        destination: Option<Address>,
    ) -> Result<ExchangeReceipt, ChainError> {
        self.transact(|c| {
            let mut ctx = ExchangeContext {
                registry: &mut c.registry,
                whitelist: &c.whitelist,
                host: &mut c.host,
            };
            Ok(c.router
                .exchange_with_permit(relayer, asset, permit, destination, &mut c.permits, &mut ctx)?)
        })
    }

    /// Register an approval signer. Returns the address the key controls.
    pub fn register_signer(&mut self, key: VerifyingKey) -> Address {
        self.permits.register_key(key)
    }
}
