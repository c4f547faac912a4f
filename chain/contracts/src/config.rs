//! Configuration for the whitelist, the router and the assembled chain
//!
//! Defaults equal the fixed protocol constants. Configuration can be loaded
//! from JSON and is validated before use.

use serde::{Deserialize, Serialize};
use types::ids::Address;
use types::numeric::Amount;

use crate::errors::ConfigError;

/// Maximum number of assets accepted by one whitelist batch add.
pub const MAX_WHITELIST_BATCH: usize = 50;

/// Maximum page size returned by whitelist pagination.
pub const MAX_PAGE_SIZE: usize = 100;

/// Default lifetime of a cached whitelist page, in seconds.
pub const DEFAULT_PAGE_CACHE_TTL_SECS: u64 = 300;

/// Default number of cached whitelist pages.
pub const DEFAULT_PAGE_CACHE_ENTRIES: usize = 64;

/// Maximum age of a price-feed answer, in seconds (30 minutes).
pub const PRICE_FRESHNESS_SECS: u64 = 30 * 60;

/// Maximum number of swaps the router executes per period.
pub const MAX_SWAPS_PER_PERIOD: u32 = 10;

/// Whitelist configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    /// Maximum assets per batch add
    pub max_batch: usize,
    /// Maximum assets per page
    pub max_page: usize,
    /// Lifetime of a cached page, in seconds
    pub cache_ttl_secs: u64,
    /// Maximum cached pages before eviction
    pub cache_entries: usize,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            max_batch: MAX_WHITELIST_BATCH,
            max_page: MAX_PAGE_SIZE,
            cache_ttl_secs: DEFAULT_PAGE_CACHE_TTL_SECS,
            cache_entries: DEFAULT_PAGE_CACHE_ENTRIES,
        }
    }
}

impl WhitelistConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch == 0 || self.max_page == 0 {
            return Err(ConfigError::Invalid {
                reason: "whitelist batch and page caps must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Exchange router configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Smallest accepted input amount, in the input asset's base units
    pub min_deposit: Amount,
    /// Largest accepted input amount, in the input asset's base units
    pub max_deposit: Amount,
    /// Swaps allowed per period
    pub max_swaps_per_period: u32,
    /// Maximum price age, in seconds
    pub price_freshness_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_deposit: 1,
            max_deposit: Amount::MAX,
            max_swaps_per_period: MAX_SWAPS_PER_PERIOD,
            price_freshness_secs: PRICE_FRESHNESS_SECS,
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_deposit == 0 {
            return Err(ConfigError::Invalid {
                reason: "min_deposit must be positive".to_string(),
            });
        }
        if self.min_deposit > self.max_deposit {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "min_deposit {} exceeds max_deposit {}",
                    self.min_deposit, self.max_deposit
                ),
            });
        }
        if self.max_swaps_per_period == 0 {
            return Err(ConfigError::Invalid {
                reason: "max_swaps_per_period must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration of an assembled chain: identities plus component settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Owner of the asset whitelist
    pub whitelist_owner: Address,
    /// Administrator of the vault registry
    pub registry_admin: Address,
    /// Owner of the exchange router
    pub router_owner: Address,
    /// Party whose vaults back exchanges
    pub reserve_owner: Address,
    /// Initial block height
    #[serde(default)]
    pub genesis_height: u64,
    /// Initial unix timestamp, in seconds
    #[serde(default)]
    pub genesis_timestamp: u64,
    #[serde(default)]
    pub whitelist: WhitelistConfig,
    #[serde(default)]
    pub router: RouterConfig,
}

impl ChainConfig {
    /// Configuration where one operator holds every administrative role.
    pub fn single_operator(operator: Address) -> Self {
        Self {
            whitelist_owner: operator,
            registry_admin: operator,
            router_owner: operator,
            reserve_owner: operator,
            genesis_height: 1,
            genesis_timestamp: 1_700_000_000,
            whitelist: WhitelistConfig::default(),
            router: RouterConfig::default(),
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ChainConfig = serde_json::from_str(json).map_err(|e| ConfigError::Malformed {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (role, address) in [
            ("whitelist_owner", self.whitelist_owner),
            ("registry_admin", self.registry_admin),
            ("router_owner", self.router_owner),
            ("reserve_owner", self.reserve_owner),
        ] {
            if address.is_zero() {
                return Err(ConfigError::Invalid {
                    reason: format!("{} must not be the zero address", role),
                });
            }
        }
        self.whitelist.validate()?;
        self.router.validate()
    }
}
