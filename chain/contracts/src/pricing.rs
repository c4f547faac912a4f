//! Price feeds and fixed-point conversion into the settlement asset
//!
//! Every payment asset carries a scaling factor derived once at registration:
//!
//! ```text
//! scaling_factor = 10^(SETTLEMENT_DECIMALS + feed_decimals - asset_decimals)
//! settlement     = amount * scaling_factor / price
//! ```
//!
//! With a 6-decimal asset and an 8-decimal feed the factor is 10^20, so the
//! conversion is done in `u128` with the multiplication checked.

use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::warn;
use types::ids::Address;
use types::numeric::{mul_div, pow10, Amount, SETTLEMENT_DECIMALS};

use crate::errors::PriceError;

/// One answer reported by a price feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundData {
    pub round_id: u64,
    /// Price of one whole input unit in settlement units, at the feed's decimals
    pub answer: i128,
    /// Unix seconds of the last update
    pub updated_at: u64,
    /// Round in which the answer was computed
    pub answered_in_round: u64,
}

/// Read side of an external price oracle.
pub trait PriceFeed: fmt::Debug + Send + Sync {
    fn decimals(&self) -> u8;

    fn latest_round(&self) -> RoundData;
}

/// Price feed whose answer is set by hand. Used for tests and simulations.
#[derive(Debug)]
pub struct ManualPriceFeed {
    decimals: u8,
    round: RwLock<RoundData>,
}

impl ManualPriceFeed {
    /// A feed with no round reported yet.
    pub fn new(decimals: u8) -> Self {
        Self {
            decimals,
            round: RwLock::new(RoundData::default()),
        }
    }

    /// A feed already reporting `answer` at `updated_at`.
    pub fn with_answer(decimals: u8, answer: i128, updated_at: u64) -> Self {
        let feed = Self::new(decimals);
        feed.set_answer(answer, updated_at);
        feed
    }

    /// Publish a new answer in a fresh round.
    pub fn set_answer(&self, answer: i128, updated_at: u64) {
        let mut round = match self.round.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let round_id = round.round_id + 1;
        *round = RoundData {
            round_id,
            answer,
            updated_at,
            answered_in_round: round_id,
        };
    }

    /// Overwrite the raw round, including malformed ones.
    pub fn set_round(&self, data: RoundData) {
        let mut round = match self.round.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *round = data;
    }
}

impl PriceFeed for ManualPriceFeed {
    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn latest_round(&self) -> RoundData {
        match self.round.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Registration of one payment asset with the router.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    pub supported: bool,
    pub decimals: u8,
    pub feed: Arc<dyn PriceFeed>,
    pub scaling_factor: Amount,
}

impl AssetConfig {
    /// Build a config, deriving the scaling factor from the asset and feed
    /// precisions.
    pub fn new(decimals: u8, feed: Arc<dyn PriceFeed>) -> Result<Self, PriceError> {
        let scaling_factor = scaling_factor(decimals, feed.decimals())?;
        Ok(Self {
            supported: true,
            decimals,
            feed,
            scaling_factor,
        })
    }

    /// Re-derive the scaling factor for new asset decimals. Returns whether
    /// anything changed; an unchanged precision keeps the stored factor.
    pub fn refresh_decimals(&mut self, decimals: u8) -> Result<bool, PriceError> {
        if decimals == self.decimals {
            return Ok(false);
        }
        self.scaling_factor = scaling_factor(decimals, self.feed.decimals())?;
        self.decimals = decimals;
        Ok(true)
    }
}

/// `10^(SETTLEMENT_DECIMALS + feed_decimals - asset_decimals)`.
pub fn scaling_factor(asset_decimals: u8, feed_decimals: u8) -> Result<Amount, PriceError> {
    let exp = (SETTLEMENT_DECIMALS as i32) + (feed_decimals as i32) - (asset_decimals as i32);
    if exp < 0 {
        return Err(PriceError::UnsupportedDecimals {
            asset_decimals,
            feed_decimals,
        });
    }
    Ok(pow10(exp as u32)?)
}

/// Validate a round against the freshness window and return its positive price.
pub fn validated_price(
    round: &RoundData,
    now: u64,
    freshness_secs: u64,
) -> Result<Amount, PriceError> {
    if round.round_id == 0 || round.updated_at == 0 || round.answered_in_round < round.round_id {
        return Err(PriceError::InvalidRound);
    }
    // A timestamp ahead of the host clock counts as age zero.
    if now.saturating_sub(round.updated_at) > freshness_secs {
        warn!(updated_at = round.updated_at, now, "Stale price rejected");
        return Err(PriceError::StalePrice {
            updated_at: round.updated_at,
            now,
        });
    }
    if round.answer <= 0 {
        return Err(PriceError::InvalidPrice {
            price: round.answer,
        });
    }
    Ok(round.answer as Amount)
}

/// Convert `amount` of an input asset into settlement base units.
pub fn convert(amount: Amount, scaling_factor: Amount, price: Amount) -> Result<Amount, PriceError> {
    if amount == 0 {
        return Err(PriceError::ZeroAmount);
    }
    Ok(mul_div(amount, scaling_factor, price)?)
}

/// Price `amount` of `asset` under `config` as of `now`.
pub fn settlement_amount(
    asset: Address,
    config: &AssetConfig,
    amount: Amount,
    now: u64,
    freshness_secs: u64,
) -> Result<Amount, PriceError> {
    if amount == 0 {
        return Err(PriceError::ZeroAmount);
    }
    if !config.supported {
        return Err(PriceError::NotSupported { asset });
    }
    let round = config.feed.latest_round();
    let price = validated_price(&round, now, freshness_secs)?;
    convert(amount, config.scaling_factor, price)
}
