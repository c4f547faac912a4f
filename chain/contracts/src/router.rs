//! Exchange router: swaps a payment asset for settlement asset
//!
//! Exchange path:
//! 1. Resolve the asset (default when none given) and validate bounds
//! 2. Count the swap against the per-period limit
//! 3. Price the amount through the asset's feed
//! 4. Select a reserve vault through the registry
//! 5. Pull the asset into the router and deposit it into the vault
//! 6. Have the vault push settlement asset to the destination
//!
//! The router mutates state as it goes. Atomicity comes from the caller's
//! transaction boundary ([`crate::chain::Chain::transact`]), which discards
//! every change, the rate-limit count included, when any step fails.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use types::ids::Address;
use types::numeric::Amount;

use crate::approval::{ApprovalVerifier, Permit};
use crate::config::RouterConfig;
use crate::errors::{PriceError, RouterError};
use crate::events::{
    ContractEvent, DefaultAssetSet, Exchanged, PaymentAssetConfigured, PaymentAssetRemoved,
};
use crate::host::Host;
use crate::pricing::{self, AssetConfig, PriceFeed};
use crate::rate_limit::RateLimitWindow;
use crate::registry::VaultRegistry;
use crate::security::AccessControl;
use crate::whitelist::AssetWhitelist;

/// Components an exchange reads and moves funds through.
pub struct ExchangeContext<'a> {
    pub registry: &'a mut VaultRegistry,
    pub whitelist: &'a AssetWhitelist,
    pub host: &'a mut Host,
}

/// Result of a completed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeReceipt {
    pub asset: Address,
    pub amount: Amount,
    pub vault: Address,
    pub settlement_amount: Amount,
    pub destination: Address,
}

#[derive(Debug, Clone)]
pub struct ExchangeRouter {
    address: Address,
    access_control: AccessControl,
    config: RouterConfig,
    /// Party whose vaults back exchanges
    reserve_owner: Address,
    assets: BTreeMap<Address, AssetConfig>,
    default_asset: Option<Address>,
    window: RateLimitWindow,
}

impl ExchangeRouter {
    pub fn new(address: Address, owner: Address, reserve_owner: Address, config: RouterConfig) -> Self {
        Self {
            address,
            access_control: AccessControl::new(owner),
            config,
            reserve_owner,
            assets: BTreeMap::new(),
            default_asset: None,
            window: RateLimitWindow::new(),
        }
    }

    // ───────────────────────── Administration ─────────────────────────

    /// Register `asset` as a payment asset priced by `feed`.
    ///
    /// The asset must be whitelisted. Its decimals are read from the host and
    /// the scaling factor is derived here, once.
    pub fn add_payment_asset(
        &mut self,
        caller: Address,
        asset: Address,
        feed: Arc<dyn PriceFeed>,
        whitelist: &AssetWhitelist,
        host: &mut Host,
    ) -> Result<Amount, RouterError> {
        self.require_owner(caller)?;
        if asset.is_zero() || asset.is_native() {
            return Err(RouterError::InvalidIdentifier);
        }
        if !whitelist.contains(asset) {
            return Err(RouterError::NotSupported { asset });
        }
        let decimals = host.decimals(asset)?;
        let config = AssetConfig::new(decimals, feed)?;
        let scaling_factor = config.scaling_factor;
        self.assets.insert(asset, config);

        host.emit(ContractEvent::PaymentAssetConfigured(PaymentAssetConfigured {
            actor: caller,
            asset,
            decimals,
            scaling_factor,
        }));
        info!(asset = %asset, decimals, scaling_factor, "Payment asset configured");
        Ok(scaling_factor)
    }

    pub fn remove_payment_asset(&mut self, caller: Address, asset: Address, host: &mut Host) -> Result<(), RouterError> {
        self.require_owner(caller)?;
        if self.assets.remove(&asset).is_none() {
            return Err(RouterError::NotSupported { asset });
        }
        if self.default_asset == Some(asset) {
            self.default_asset = None;
        }
        host.emit(ContractEvent::PaymentAssetRemoved(PaymentAssetRemoved { actor: caller, asset }));
        info!(asset = %asset, "Payment asset removed");
        Ok(())
    }

    /// Asset used when an exchange names none.
    pub fn set_default_asset(&mut self, caller: Address, asset: Address, host: &mut Host) -> Result<(), RouterError> {
        self.require_owner(caller)?;
        if !self.is_supported(asset) {
            return Err(RouterError::NotSupported { asset });
        }
        self.default_asset = Some(asset);
        host.emit(ContractEvent::DefaultAssetSet(DefaultAssetSet { actor: caller, asset }));
        Ok(())
    }

    pub fn set_deposit_bounds(&mut self, caller: Address, minimum: Amount, maximum: Amount) -> Result<(), RouterError> {
        self.require_owner(caller)?;
        if minimum == 0 || minimum > maximum {
            return Err(RouterError::InvalidBounds { minimum, maximum });
        }
        self.config.min_deposit = minimum;
        self.config.max_deposit = maximum;
        info!(minimum, maximum, "Deposit bounds updated");
        Ok(())
    }

    pub fn set_reserve_owner(&mut self, caller: Address, reserve_owner: Address) -> Result<(), RouterError> {
        self.require_owner(caller)?;
        if reserve_owner.is_zero() {
            return Err(RouterError::InvalidIdentifier);
        }
        self.reserve_owner = reserve_owner;
        Ok(())
    }

    /// Re-read the asset's decimals and re-derive its scaling factor if they
    /// changed. Returns whether the config was updated.
    pub fn refresh_asset_decimals(&mut self, caller: Address, asset: Address, host: &mut Host) -> Result<bool, RouterError> {
        self.require_owner(caller)?;
        let decimals = host.decimals(asset)?;
        let config = self
            .assets
            .get_mut(&asset)
            .ok_or(RouterError::NotSupported { asset })?;
        if !config.refresh_decimals(decimals)? {
            return Ok(false);
        }
        let scaling_factor = config.scaling_factor;
        host.emit(ContractEvent::PaymentAssetConfigured(PaymentAssetConfigured {
            actor: caller,
            asset,
            decimals,
            scaling_factor,
        }));
        info!(asset = %asset, decimals, scaling_factor, "Payment asset decimals refreshed");
        Ok(true)
    }

    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> Result<(), RouterError> {
        if !self.access_control.transfer_ownership(caller, new_owner) {
            return Err(RouterError::Unauthorized);
        }
        Ok(())
    }

    // ───────────────────────── Pricing ─────────────────────────

    /// Settlement amount `amount` of `asset` is worth right now.
    pub fn price_of(&self, asset: Address, amount: Amount, host: &Host) -> Result<Amount, RouterError> {
        if amount == 0 {
            return Err(RouterError::ZeroAmount);
        }
        let config = self
            .assets
            .get(&asset)
            .filter(|c| c.supported)
            .ok_or(RouterError::NotSupported { asset })?;
        pricing::settlement_amount(asset, config, amount, host.timestamp(), self.config.price_freshness_secs)
            .map_err(|e| {
                if matches!(e, PriceError::StalePrice { .. }) {
                    warn!(asset = %asset, "Exchange priced against a stale feed");
                }
                RouterError::from(e)
            })
    }

    /// Price without executing, resolving an absent asset to the default.
    pub fn quote(&self, asset: Option<Address>, amount: Amount, host: &Host) -> Result<Amount, RouterError> {
        let asset = self.resolve_asset(asset)?;
        self.price_of(asset, amount, host)
    }

    // ───────────────────────── Exchange ─────────────────────────

    /// Swap `amount` of `asset` held by `caller` for settlement asset sent
    /// to `destination` (the caller when absent).
    pub fn exchange(
        &mut self,
        caller: Address,
        asset: Option<Address>,
        amount: Amount,
        destination: Option<Address>,
        ctx: &mut ExchangeContext<'_>,
    ) -> Result<ExchangeReceipt, RouterError> {
        self.execute(caller, asset, amount, destination, ctx)
    }

    /// Exchange whose allowance comes from a signed approval.
    ///
    /// The depositor is the permit's owner; `relayer` only submits it.
    pub fn exchange_with_permit(
        &mut self,
        relayer: Address,
        asset: Option<Address>,
        permit: &Permit,
        destination: Option<Address>,
        verifier: &mut dyn ApprovalVerifier,
        ctx: &mut ExchangeContext<'_>,
    ) -> Result<ExchangeReceipt, RouterError> {
        let now = ctx.host.timestamp();
        if now > permit.deadline {
            return Err(RouterError::ExpiredAuthorization {
                deadline: permit.deadline,
                now,
            });
        }
        if permit.spender != self.address {
            return Err(RouterError::InvalidIdentifier);
        }
        let asset = self.resolve_asset(asset)?;
        verifier.consume_approval(asset, permit, ctx.host)?;
        info!(relayer = %relayer.short(), owner = %permit.owner.short(), "Exchange via signed approval");
        self.execute(permit.owner, Some(asset), permit.amount, destination, ctx)
    }

    fn execute(
        &mut self,
        depositor: Address,
        asset: Option<Address>,
        amount: Amount,
        destination: Option<Address>,
        ctx: &mut ExchangeContext<'_>,
    ) -> Result<ExchangeReceipt, RouterError> {
        let asset = self.resolve_asset(asset)?;
        if !self.is_supported(asset) {
            return Err(RouterError::NotSupported { asset });
        }
        if destination == Some(self.address) {
            return Err(RouterError::InvalidDestination);
        }
        self.check_bounds(amount)?;

        let period = ctx.host.block_height();
        if !self.window.try_record(period, self.config.max_swaps_per_period) {
            warn!(period, depositor = %depositor.short(), "Swap rate limit reached");
            return Err(RouterError::RateLimitExceeded {
                period,
                limit: self.config.max_swaps_per_period,
            });
        }

        let settlement_amount = self.price_of(asset, amount, ctx.host)?;
        let destination = match destination {
            Some(d) if !d.is_zero() => d,
            _ => depositor,
        };
        let vault = ctx
            .registry
            .find_best_vault(self.reserve_owner, settlement_amount, ctx.host)?;

        // Pull into the router, then forward what actually arrived.
        let received = ctx
            .host
            .transfer_from(asset, self.address, depositor, self.address, amount)?;
        ctx.host.approve(asset, self.address, vault, received)?;
        let vault_ref = ctx.registry.vault_mut(vault)?;
        vault_ref.deposit_asset(self.address, asset, received, ctx.whitelist, ctx.host)?;
        vault_ref.push_settlement_asset(self.address, settlement_amount, destination, ctx.host)?;

        ctx.host.emit(ContractEvent::Exchanged(Exchanged {
            depositor,
            asset,
            amount,
            vault,
            settlement_amount,
            destination,
        }));
        info!(
            depositor = %depositor.short(),
            asset = %asset,
            amount,
            vault = %vault.short(),
            settlement_amount,
            destination = %destination.short(),
            "Exchange executed"
        );
        Ok(ExchangeReceipt {
            asset,
            amount,
            vault,
            settlement_amount,
            destination,
        })
    }

    fn resolve_asset(&self, asset: Option<Address>) -> Result<Address, RouterError> {
        match asset {
            Some(a) if !a.is_zero() => Ok(a),
            _ => self.default_asset.ok_or(RouterError::NotSupported { asset: Address::ZERO }),
        }
    }

    fn check_bounds(&self, amount: Amount) -> Result<(), RouterError> {
        if amount == 0 {
            return Err(RouterError::ZeroAmount);
        }
        if amount < self.config.min_deposit {
            return Err(RouterError::BelowMinimum {
                amount,
                minimum: self.config.min_deposit,
            });
        }
        if amount > self.config.max_deposit {
            return Err(RouterError::AboveMaximum {
                amount,
                maximum: self.config.max_deposit,
            });
        }
        Ok(())
    }

    fn require_owner(&self, caller: Address) -> Result<(), RouterError> {
        if !self.access_control.is_owner(caller) {
            return Err(RouterError::Unauthorized);
        }
        Ok(())
    }

    // ───────────────────────── Queries ─────────────────────────

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.access_control.owner()
    }

    pub fn reserve_owner(&self) -> Address {
        self.reserve_owner
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn default_asset(&self) -> Option<Address> {
        self.default_asset
    }

    pub fn asset_config(&self, asset: Address) -> Option<&AssetConfig> {
        self.assets.get(&asset)
    }

    pub fn is_supported(&self, asset: Address) -> bool {
        self.assets.get(&asset).is_some_and(|c| c.supported)
    }

    pub fn supported_assets(&self) -> Vec<Address> {
        self.assets
            .iter()
            .filter(|(_, c)| c.supported)
            .map(|(a, _)| *a)
            .collect()
    }

    /// Swaps still allowed in `period`.
    pub fn remaining_swaps(&self, period: u64) -> u32 {
        self.window.remaining(period, self.config.max_swaps_per_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WhitelistConfig;
    use crate::errors::RegistryError;
    use crate::pricing::ManualPriceFeed;
    use crate::registry::VaultTemplate;

    const NOW: u64 = 1_700_000_000;
    const PRICE: i128 = 2_000 * 100_000_000;

    struct Fixture {
        host: Host,
        whitelist: AssetWhitelist,
        registry: VaultRegistry,
        router: ExchangeRouter,
        usdc: Address,
        feed: Arc<ManualPriceFeed>,
    }

    fn operator() -> Address {
        Address::from_label("operator")
    }

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn setup(reserve: Amount) -> Fixture {
        let mut host = Host::new(1, NOW);
        let usdc = host.deploy_token("USDC", 6);
        let mut whitelist = AssetWhitelist::new(Address::from_label("whitelist"), operator(), WhitelistConfig::default());
        whitelist.add(operator(), usdc, &mut host).unwrap();

        let router_addr = Address::from_label("router");
        let mut registry = VaultRegistry::new(Address::from_label("registry"), operator(), whitelist.address());
        registry
            .set_implementation(operator(), VaultTemplate { version: 1, default_router: Some(router_addr) })
            .unwrap();
        let vault = registry.create_vault(operator(), operator(), &mut host).unwrap();
        host.fund_native(vault, reserve).unwrap();

        let mut router = ExchangeRouter::new(router_addr, operator(), operator(), RouterConfig::default());
        let feed = Arc::new(ManualPriceFeed::with_answer(8, PRICE, NOW));
        router
            .add_payment_asset(operator(), usdc, feed.clone(), &whitelist, &mut host)
            .unwrap();
        router.set_default_asset(operator(), usdc, &mut host).unwrap();

        host.mint(usdc, alice(), 1_000_000 * 1_000_000).unwrap();
        host.approve(usdc, alice(), router_addr, Amount::MAX).unwrap();

        Fixture { host, whitelist, registry, router, usdc, feed }
    }

    fn exchange(f: &mut Fixture, amount: Amount) -> Result<ExchangeReceipt, RouterError> {
        let mut ctx = ExchangeContext {
            registry: &mut f.registry,
            whitelist: &f.whitelist,
            host: &mut f.host,
        };
        f.router.exchange(alice(), None, amount, None, &mut ctx)
    }

    #[test]
    fn test_add_payment_asset_derives_scaling_factor() {
        let f = setup(0);
        let config = f.router.asset_config(f.usdc).unwrap();
        assert_eq!(config.decimals, 6);
        assert_eq!(config.scaling_factor, 10u128.pow(20));
    }

    #[test]
    fn test_add_payment_asset_requires_whitelisting() {
        let mut f = setup(0);
        let dai = f.host.deploy_token("DAI", 18);
        let result = f.router.add_payment_asset(operator(), dai, f.feed.clone(), &f.whitelist, &mut f.host);
        assert_eq!(result, Err(RouterError::NotSupported { asset: dai }));
    }

    #[test]
    fn test_price_of_one_unit() {
        let f = setup(0);
        assert_eq!(
            f.router.price_of(f.usdc, 2_000 * 1_000_000, &f.host),
            Ok(1_000_000_000_000_000_000)
        );
        assert_eq!(f.router.price_of(f.usdc, 0, &f.host), Err(RouterError::ZeroAmount));
    }

    #[test]
    fn test_exchange_moves_funds() {
        let mut f = setup(10u128.pow(19));
        let receipt = exchange(&mut f, 2_000 * 1_000_000).unwrap();
        assert_eq!(receipt.settlement_amount, 10u128.pow(18));
        assert_eq!(receipt.destination, alice());
        assert_eq!(f.host.native_balance(alice()), 10u128.pow(18));

        let vault = f.registry.vault(receipt.vault).unwrap();
        assert_eq!(vault.balance_of(f.router.address(), f.usdc), 2_000 * 1_000_000);
        assert_eq!(f.host.balance_of(f.usdc, receipt.vault), 2_000 * 1_000_000);
        assert_eq!(f.router.remaining_swaps(1), 9);
    }

    #[test]
    fn test_exchange_rejects_router_destination() {
        let mut f = setup(10u128.pow(19));
        let router_addr = f.router.address();
        let mut ctx = ExchangeContext {
            registry: &mut f.registry,
            whitelist: &f.whitelist,
            host: &mut f.host,
        };
        let result = f.router.exchange(alice(), None, 1_000_000, Some(router_addr), &mut ctx);
        assert_eq!(result, Err(RouterError::InvalidDestination));
    }

    #[test]
    fn test_exchange_without_default_asset() {
        let mut f = setup(0);
        f.router.remove_payment_asset(operator(), f.usdc, &mut f.host).unwrap();
        assert_eq!(f.router.default_asset(), None);
        assert_eq!(
            exchange(&mut f, 1),
            Err(RouterError::NotSupported { asset: Address::ZERO })
        );
    }

    #[test]
    fn test_exchange_deposit_bounds() {
        let mut f = setup(10u128.pow(20));
        f.router.set_deposit_bounds(operator(), 1_000_000, 5_000_000).unwrap();
        assert_eq!(
            exchange(&mut f, 999_999),
            Err(RouterError::BelowMinimum { amount: 999_999, minimum: 1_000_000 })
        );
        assert_eq!(
            exchange(&mut f, 5_000_001),
            Err(RouterError::AboveMaximum { amount: 5_000_001, maximum: 5_000_000 })
        );
        assert!(exchange(&mut f, 1_000_000).is_ok());
    }

    #[test]
    fn test_set_deposit_bounds_validates() {
        let mut f = setup(0);
        assert_eq!(
            f.router.set_deposit_bounds(operator(), 10, 5),
            Err(RouterError::InvalidBounds { minimum: 10, maximum: 5 })
        );
        assert_eq!(
            f.router.set_deposit_bounds(alice(), 1, 5),
            Err(RouterError::Unauthorized)
        );
    }

    #[test]
    fn test_exchange_needs_reserve() {
        let mut f = setup(10);
        assert_eq!(
            exchange(&mut f, 2_000 * 1_000_000),
            Err(RouterError::Registry(RegistryError::InsufficientAggregateBalance {
                required: 10u128.pow(18),
                available: 10
            }))
        );
    }

    #[test]
    fn test_refresh_asset_decimals() {
        let mut f = setup(0);
        assert!(!f.router.refresh_asset_decimals(operator(), f.usdc, &mut f.host).unwrap());
        f.host.set_decimals(f.usdc, 8).unwrap();
        assert!(f.router.refresh_asset_decimals(operator(), f.usdc, &mut f.host).unwrap());
        assert_eq!(f.router.asset_config(f.usdc).unwrap().scaling_factor, 10u128.pow(18));
    }

    #[test]
    fn test_quote_uses_default_asset() {
        let f = setup(0);
        assert_eq!(f.router.quote(None, 4_000 * 1_000_000, &f.host), Ok(2 * 10u128.pow(18)));
    }
}
