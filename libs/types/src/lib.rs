//! Types library for the custody-and-routing engine
//!
//! Primitive definitions shared by the whitelist, vaults, the registry and
//! the exchange router.
//!
//! # Modules
//! - `ids`: 20-byte `Address` identifiers and their sentinels
//! - `numeric`: base-unit amounts and checked fixed-point helpers
//! - `errors`: arithmetic error taxonomy

pub mod errors;
pub mod ids;
pub mod numeric;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
}
