//! Vault: custody of depositor balances and the settlement-asset reserve
//!
//! A vault holds balances per `(depositor, asset)` and a mirror of the total
//! deposited per asset. Its native balance on the host is the settlement
//! reserve the router draws from.
//!
//! - Deposits of whitelisted assets (the settlement asset bypasses the whitelist)
//! - Owner-only withdrawals, still allowed while paused or retired
//! - Router-only settlement pushes, blocked while paused or retired
//! - Owner pause/unpause, registry-only retirement
//! - Emergency recovery of unallocated surplus while paused
//! - Reentrancy guard around every money-moving entry point

use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};
use types::ids::Address;
use types::numeric::Amount;

use crate::errors::VaultError;
use crate::events::{
    ContractEvent, Deposited, EmergencyRecovered, ReserveMoved, SettlementPushed, VaultPaused,
    VaultRetired, VaultUnpaused, Withdrawn,
};
use crate::host::Host;
use crate::security::{AccessControl, ReentrancyGuard};
use crate::whitelist::AssetWhitelist;

/// Lifecycle of a vault.
///
/// `Active ⇄ Paused` is toggled by the owner. `Retired` is terminal and only
/// entered through the registry; it never blocks owner withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultStatus {
    Active,
    Paused,
    Retired,
}

/// Code that runs when an address receives native value from a vault.
///
/// The receiver is handed the sending vault while that vault's reentrancy
/// guard is still held, so any attempt to call back into a guarded entry
/// point fails with [`VaultError::Reentrancy`]. Returning an error reverts
/// the whole operation.
pub trait SettlementReceiver: fmt::Debug + Send + Sync {
    fn on_settlement(&self, ctx: &mut SettlementContext<'_>) -> Result<(), VaultError>;
}

/// What a [`SettlementReceiver`] sees while it runs.
pub struct SettlementContext<'a> {
    /// The vault that sent the value
    pub vault: &'a mut Vault,
    pub host: &'a mut Host,
    pub recipient: Address,
    pub amount: Amount,
}

/// A custody unit created by the registry.
#[derive(Debug, Clone)]
pub struct Vault {
    address: Address,
    /// Registry that created this vault; the only party that may retire it
    registry: Address,
    /// Whitelist the vault checks deposits against
    whitelist: Address,
    template_version: u32,
    access_control: AccessControl,
    /// Designated router allowed to push settlement asset out
    router: Option<Address>,
    status: VaultStatus,
    /// (depositor, asset) -> amount
    balances: BTreeMap<(Address, Address), Amount>,
    /// asset -> sum of all depositor balances
    total_deposited: BTreeMap<Address, Amount>,
    reentrancy_guard: ReentrancyGuard,
}

impl Vault {
    pub(crate) fn new(
        address: Address,
        owner: Address,
        registry: Address,
        whitelist: Address,
        router: Option<Address>,
        template_version: u32,
    ) -> Self {
        Self {
            address,
            registry,
            whitelist,
            template_version,
            access_control: AccessControl::new(owner),
            router,
            status: VaultStatus::Active,
            balances: BTreeMap::new(),
            total_deposited: BTreeMap::new(),
            reentrancy_guard: ReentrancyGuard::new(),
        }
    }

    // ───────────────────────── Deposit ─────────────────────────

    /// Pull `amount` of `asset` from `caller` and credit it to `caller`.
    ///
    /// The credited amount is the nominal amount instructed, even when a
    /// fee-charging token delivers less. Returns the amount credited.
    pub fn deposit_asset(
        &mut self,
        caller: Address,
        asset: Address,
        amount: Amount,
        whitelist: &AssetWhitelist,
        host: &mut Host,
    ) -> Result<Amount, VaultError> {
        self.guarded(|vault| {
            if amount == 0 {
                return Err(VaultError::ZeroAmount);
            }
            vault.check_accepting()?;
            if !asset.is_native() {
                if whitelist.address() != vault.whitelist {
                    return Err(VaultError::WhitelistMismatch);
                }
                if !whitelist.contains(asset) {
                    return Err(VaultError::NotWhitelisted { asset });
                }
            }

            let balance = vault
                .balance_of(caller, asset)
                .checked_add(amount)
                .ok_or(VaultError::Overflow)?;
            let total = vault
                .total_deposited(asset)
                .checked_add(amount)
                .ok_or(VaultError::Overflow)?;

            if asset.is_native() {
                host.transfer_native(caller, vault.address, amount)?;
            } else {
                let received = host.transfer_from(asset, vault.address, caller, vault.address, amount)?;
                if received < amount {
                    warn!(
                        vault = %vault.address.short(),
                        asset = %asset,
                        nominal = amount,
                        received,
                        "Fee-charging asset delivered less than credited"
                    );
                }
            }

            vault.balances.insert((caller, asset), balance);
            vault.total_deposited.insert(asset, total);

            host.emit(ContractEvent::Deposited(Deposited {
                vault: vault.address,
                depositor: caller,
                asset,
                amount,
            }));
            info!(vault = %vault.address.short(), depositor = %caller.short(), asset = %asset, amount, "Deposit credited");
            Ok(amount)
        })
    }

    // ───────────────────────── Withdraw ─────────────────────────

    /// Owner withdrawal of the owner's own credited balance.
    ///
    /// Allowed while paused or retired, and for assets that have since left
    /// the whitelist.
    pub fn withdraw(
        &mut self,
        caller: Address,
        asset: Address,
        amount: Amount,
        to: Address,
        host: &mut Host,
    ) -> Result<(), VaultError> {
        self.guarded(|vault| {
            if !vault.access_control.is_owner(caller) {
                return Err(VaultError::NotOwner);
            }
            if amount == 0 {
                return Err(VaultError::ZeroAmount);
            }
            if to.is_zero() {
                return Err(VaultError::InvalidIdentifier);
            }
            let available = vault.balance_of(caller, asset);
            if available < amount {
                return Err(VaultError::InsufficientBalance {
                    asset,
                    required: amount,
                    available,
                });
            }

            vault.debit(caller, asset, amount);
            vault.send(host, asset, to, amount)?;

            host.emit(ContractEvent::Withdrawn(Withdrawn {
                vault: vault.address,
                owner: caller,
                asset,
                amount,
                to,
            }));
            info!(vault = %vault.address.short(), asset = %asset, amount, to = %to.short(), "Withdrawal sent");
            vault.notify_receiver(host, asset, to, amount)
        })
    }

    // ───────────────────────── Router push ─────────────────────────

    /// Send settlement asset out of the reserve on the router's instruction.
    ///
    /// Checks the raw native balance, not the ledger total.
    pub fn push_settlement_asset(
        &mut self,
        caller: Address,
        amount: Amount,
        to: Address,
        host: &mut Host,
    ) -> Result<(), VaultError> {
        self.guarded(|vault| {
            if vault.router != Some(caller) || caller.is_zero() {
                return Err(VaultError::NotRouter);
            }
            if amount == 0 {
                return Err(VaultError::ZeroAmount);
            }
            if to.is_zero() {
                return Err(VaultError::InvalidIdentifier);
            }
            vault.check_accepting()?;
            let available = host.native_balance(vault.address);
            if available < amount {
                return Err(VaultError::InsufficientBalance {
                    asset: Address::NATIVE,
                    required: amount,
                    available,
                });
            }

            host.transfer_native(vault.address, to, amount)?;
            host.emit(ContractEvent::SettlementPushed(SettlementPushed {
                vault: vault.address,
                router: caller,
                amount,
                to,
            }));
            info!(vault = %vault.address.short(), amount, to = %to.short(), "Settlement asset pushed");
            vault.notify_receiver(host, Address::NATIVE, to, amount)
        })
    }

    // ───────────────────────── Reserve release ─────────────────────────

    /// Move settlement reserve to a sibling vault. Registry-only.
    ///
    /// Fails closed while paused or retired.
    pub fn release_reserve(
        &mut self,
        caller: Address,
        amount: Amount,
        to_vault: Address,
        host: &mut Host,
    ) -> Result<(), VaultError> {
        self.guarded(|vault| {
            if caller != vault.registry {
                return Err(VaultError::NotRegistry);
            }
            if amount == 0 {
                return Err(VaultError::ZeroAmount);
            }
            vault.check_accepting()?;
            let available = host.native_balance(vault.address);
            if available < amount {
                return Err(VaultError::InsufficientBalance {
                    asset: Address::NATIVE,
                    required: amount,
                    available,
                });
            }
            host.transfer_native(vault.address, to_vault, amount)?;
            host.emit(ContractEvent::ReserveMoved(ReserveMoved {
                from_vault: vault.address,
                to_vault,
                amount,
            }));
            Ok(())
        })
    }

    // ───────────────────────── Pause / retire ─────────────────────────

    /// Pause the vault. Owner-only.
    pub fn pause(&mut self, caller: Address, host: &mut Host) -> Result<(), VaultError> {
        if !self.access_control.is_owner(caller) {
            return Err(VaultError::NotOwner);
        }
        match self.status {
            VaultStatus::Retired => return Err(VaultError::Retired),
            VaultStatus::Paused => return Err(VaultError::Paused),
            VaultStatus::Active => {}
        }
        self.status = VaultStatus::Paused;
        host.emit(ContractEvent::VaultPaused(VaultPaused {
            vault: self.address,
            actor: caller,
        }));
        info!(vault = %self.address.short(), "Vault paused");
        Ok(())
    }

    /// Unpause the vault. Owner-only.
    pub fn unpause(&mut self, caller: Address, host: &mut Host) -> Result<(), VaultError> {
        if !self.access_control.is_owner(caller) {
            return Err(VaultError::NotOwner);
        }
        match self.status {
            VaultStatus::Retired => return Err(VaultError::Retired),
            VaultStatus::Active => return Err(VaultError::NotPaused),
            VaultStatus::Paused => {}
        }
        self.status = VaultStatus::Active;
        host.emit(ContractEvent::VaultUnpaused(VaultUnpaused {
            vault: self.address,
            actor: caller,
        }));
        info!(vault = %self.address.short(), "Vault unpaused");
        Ok(())
    }

    pub(crate) fn retire(&mut self, caller: Address, host: &mut Host) -> Result<(), VaultError> {
        if caller != self.registry {
            return Err(VaultError::NotRegistry);
        }
        if self.status == VaultStatus::Retired {
            return Err(VaultError::Retired);
        }
        self.status = VaultStatus::Retired;
        host.emit(ContractEvent::VaultRetired(VaultRetired {
            vault: self.address,
            actor: caller,
        }));
        info!(vault = %self.address.short(), "Vault retired");
        Ok(())
    }

    // ───────────────────────── Emergency recovery ─────────────────────────

    /// Recover unallocated surplus (raw balance minus ledger total).
    ///
    /// Owner-only and only while paused. Depositor-credited capital is never
    /// recoverable this way, whoever the caller is.
    pub fn emergency_recover(
        &mut self,
        caller: Address,
        asset: Address,
        amount: Amount,
        to: Address,
        host: &mut Host,
    ) -> Result<(), VaultError> {
        self.guarded(|vault| {
            if !vault.access_control.is_owner(caller) {
                return Err(VaultError::NotOwner);
            }
            if vault.status != VaultStatus::Paused {
                return Err(VaultError::NotPaused);
            }
            if amount == 0 {
                return Err(VaultError::ZeroAmount);
            }
            if to.is_zero() {
                return Err(VaultError::InvalidIdentifier);
            }
            let recoverable = vault.surplus(asset, host);
            if amount > recoverable {
                return Err(VaultError::InsufficientBalance {
                    asset,
                    required: amount,
                    available: recoverable,
                });
            }

            vault.send(host, asset, to, amount)?;
            host.emit(ContractEvent::EmergencyRecovered(EmergencyRecovered {
                vault: vault.address,
                actor: caller,
                asset,
                amount,
                to,
            }));
            warn!(vault = %vault.address.short(), asset = %asset, amount, "Emergency surplus recovery");
            vault.notify_receiver(host, asset, to, amount)
        })
    }

    // ───────────────────────── Configuration ─────────────────────────

    /// Designate the router allowed to push settlement asset. Owner or registry.
    pub fn set_router(&mut self, caller: Address, router: Address) -> Result<(), VaultError> {
        if !self.access_control.is_owner(caller) && caller != self.registry {
            return Err(VaultError::NotOwner);
        }
        if router.is_zero() {
            return Err(VaultError::InvalidIdentifier);
        }
        self.router = Some(router);
        info!(vault = %self.address.short(), router = %router.short(), "Vault router set");
        Ok(())
    }

    /// Rebind the vault to another whitelist. Owner or registry.
    pub fn set_whitelist(&mut self, caller: Address, whitelist: Address) -> Result<(), VaultError> {
        if !self.access_control.is_owner(caller) && caller != self.registry {
            return Err(VaultError::NotOwner);
        }
        if whitelist.is_zero() {
            return Err(VaultError::InvalidIdentifier);
        }
        self.whitelist = whitelist;
        Ok(())
    }

    pub(crate) fn reassign_owner(&mut self, new_owner: Address) {
        self.access_control.reassign(new_owner);
    }

    // ───────────────────────── Queries ─────────────────────────

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.access_control.owner()
    }

    pub fn router(&self) -> Option<Address> {
        self.router
    }

    pub fn registry(&self) -> Address {
        self.registry
    }

    pub fn whitelist(&self) -> Address {
        self.whitelist
    }

    pub fn template_version(&self) -> u32 {
        self.template_version
    }

    pub fn status(&self) -> VaultStatus {
        self.status
    }

    pub fn is_paused(&self) -> bool {
        self.status == VaultStatus::Paused
    }

    pub fn is_retired(&self) -> bool {
        self.status == VaultStatus::Retired
    }

    /// Whether the vault currently accepts deposits and router pushes.
    pub fn is_active(&self) -> bool {
        self.status == VaultStatus::Active
    }

    /// Credited balance of `depositor` in `asset`.
    pub fn balance_of(&self, depositor: Address, asset: Address) -> Amount {
        self.balances.get(&(depositor, asset)).copied().unwrap_or(0)
    }

    /// Sum of all depositor balances in `asset`.
    pub fn total_deposited(&self, asset: Address) -> Amount {
        self.total_deposited.get(&asset).copied().unwrap_or(0)
    }

    /// Settlement reserve: the vault's raw native balance.
    pub fn reserve(&self, host: &Host) -> Amount {
        host.native_balance(self.address)
    }

    /// Raw holdings of `asset` not backed by any depositor credit.
    pub fn surplus(&self, asset: Address, host: &Host) -> Amount {
        host.asset_balance(asset, self.address)
            .saturating_sub(self.total_deposited(asset))
    }

    /// Whether every asset's depositor balances sum to its tracked total.
    pub fn ledger_consistent(&self) -> bool {
        let mut sums: BTreeMap<Address, Amount> = BTreeMap::new();
        for ((_, asset), amount) in &self.balances {
            let entry = sums.entry(*asset).or_insert(0);
            *entry = match entry.checked_add(*amount) {
                Some(sum) => sum,
                None => return false,
            };
        }
        let tracked = self.total_deposited.iter().filter(|(_, total)| **total > 0);
        let summed = sums.iter().filter(|(_, total)| **total > 0);
        tracked.eq(summed)
    }

    // ───────────────────────── Internal ─────────────────────────

    fn guard_mut(&mut self) -> &mut ReentrancyGuard {
        &mut self.reentrancy_guard
    }

    fn guarded<T>(
        &mut self,
        body: impl FnOnce(&mut Vault) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        let address = self.address;
        ReentrancyGuard::scoped(
            self,
            Vault::guard_mut,
            || {
                warn!(vault = %address.short(), "Reentrant call rejected");
                VaultError::Reentrancy
            },
            body,
        )
    }

    fn check_accepting(&self) -> Result<(), VaultError> {
        match self.status {
            VaultStatus::Active => Ok(()),
            VaultStatus::Paused => Err(VaultError::Paused),
            VaultStatus::Retired => Err(VaultError::Retired),
        }
    }

    /// Debit a balance already checked to be sufficient.
    fn debit(&mut self, depositor: Address, asset: Address, amount: Amount) {
        let balance = self.balance_of(depositor, asset) - amount;
        let total = self.total_deposited(asset).saturating_sub(amount);
        if balance == 0 {
            self.balances.remove(&(depositor, asset));
        } else {
            self.balances.insert((depositor, asset), balance);
        }
        self.total_deposited.insert(asset, total);
    }

    fn send(&self, host: &mut Host, asset: Address, to: Address, amount: Amount) -> Result<(), VaultError> {
        if asset.is_native() {
            host.transfer_native(self.address, to, amount)?;
        } else {
            host.transfer(asset, self.address, to, amount)?;
        }
        Ok(())
    }

    /// Hand control to the recipient's receiver, if it has one. Only native
    /// transfers execute recipient code.
    fn notify_receiver(
        &mut self,
        host: &mut Host,
        asset: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), VaultError> {
        if !asset.is_native() {
            return Ok(());
        }
        if let Some(receiver) = host.receiver(to) {
            let mut ctx = SettlementContext {
                vault: self,
                host,
                recipient: to,
                amount,
            };
            receiver.on_settlement(&mut ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WhitelistConfig;
    use std::sync::Arc;

    struct Fixture {
        host: Host,
        whitelist: AssetWhitelist,
        vault: Vault,
        usdc: Address,
    }

    fn owner() -> Address {
        Address::from_label("owner")
    }

    fn router() -> Address {
        Address::from_label("router")
    }

    fn registry() -> Address {
        Address::from_label("registry")
    }

    fn setup() -> Fixture {
        let mut host = Host::new(1, 1_000);
        let usdc = host.deploy_token("USDC", 6);
        let mut whitelist =
            AssetWhitelist::new(Address::from_label("whitelist"), owner(), WhitelistConfig::default());
        whitelist.add(owner(), usdc, &mut host).unwrap();
        let vault = Vault::new(
            Address::from_label("vault"),
            owner(),
            registry(),
            whitelist.address(),
            Some(router()),
            1,
        );
        Fixture {
            host,
            whitelist,
            vault,
            usdc,
        }
    }

    fn fund_token(f: &mut Fixture, who: Address, amount: Amount) {
        f.host.mint(f.usdc, who, amount).unwrap();
        f.host.approve(f.usdc, who, f.vault.address(), amount).unwrap();
    }

    // ─── Deposit tests ───

    #[test]
    fn test_deposit_credits_depositor() {
        let mut f = setup();
        let alice = Address::from_label("alice");
        fund_token(&mut f, alice, 500);

        f.vault.deposit_asset(alice, f.usdc, 500, &f.whitelist, &mut f.host).unwrap();
        assert_eq!(f.vault.balance_of(alice, f.usdc), 500);
        assert_eq!(f.vault.total_deposited(f.usdc), 500);
        assert_eq!(f.host.balance_of(f.usdc, f.vault.address()), 500);
        assert!(f.vault.ledger_consistent());
    }

    #[test]
    fn test_deposit_zero_amount() {
        let mut f = setup();
        let result = f.vault.deposit_asset(owner(), f.usdc, 0, &f.whitelist, &mut f.host);
        assert_eq!(result, Err(VaultError::ZeroAmount));
    }

    #[test]
    fn test_deposit_non_whitelisted() {
        let mut f = setup();
        let shib = f.host.deploy_token("SHIB", 18);
        let result = f.vault.deposit_asset(owner(), shib, 1, &f.whitelist, &mut f.host);
        assert_eq!(result, Err(VaultError::NotWhitelisted { asset: shib }));
    }

    #[test]
    fn test_deposit_native_bypasses_whitelist() {
        let mut f = setup();
        f.host.fund_native(owner(), 1_000).unwrap();
        f.vault
            .deposit_asset(owner(), Address::NATIVE, 1_000, &f.whitelist, &mut f.host)
            .unwrap();
        assert_eq!(f.vault.reserve(&f.host), 1_000);
        assert_eq!(f.vault.total_deposited(Address::NATIVE), 1_000);
    }

    #[test]
    fn test_deposit_rejected_while_paused() {
        let mut f = setup();
        fund_token(&mut f, owner(), 10);
        f.vault.pause(owner(), &mut f.host).unwrap();
        let result = f.vault.deposit_asset(owner(), f.usdc, 10, &f.whitelist, &mut f.host);
        assert_eq!(result, Err(VaultError::Paused));
    }

    #[test]
    fn test_deposit_credits_nominal_amount_for_fee_token() {
        let mut f = setup();
        let alice = Address::from_label("alice");
        fund_token(&mut f, alice, 10_000);
        f.host.set_transfer_fee(f.usdc, 100).unwrap();

        f.vault.deposit_asset(alice, f.usdc, 10_000, &f.whitelist, &mut f.host).unwrap();
        assert_eq!(f.vault.balance_of(alice, f.usdc), 10_000);
        assert_eq!(f.host.balance_of(f.usdc, f.vault.address()), 9_900);
    }

    #[test]
    fn test_deposit_against_foreign_whitelist() {
        let mut f = setup();
        let other = AssetWhitelist::new(Address::from_label("other"), owner(), WhitelistConfig::default());
        let result = f.vault.deposit_asset(owner(), f.usdc, 1, &other, &mut f.host);
        assert_eq!(result, Err(VaultError::WhitelistMismatch));
    }

    // ─── Withdraw tests ───

    #[test]
    fn test_withdraw_round_trip() {
        let mut f = setup();
        fund_token(&mut f, owner(), 300);
        f.vault.deposit_asset(owner(), f.usdc, 300, &f.whitelist, &mut f.host).unwrap();
        f.vault.withdraw(owner(), f.usdc, 300, owner(), &mut f.host).unwrap();
        assert_eq!(f.vault.balance_of(owner(), f.usdc), 0);
        assert_eq!(f.host.balance_of(f.usdc, owner()), 300);
        assert!(f.vault.ledger_consistent());
    }

    #[test]
    fn test_withdraw_not_owner() {
        let mut f = setup();
        let eve = Address::from_label("eve");
        let result = f.vault.withdraw(eve, f.usdc, 1, eve, &mut f.host);
        assert_eq!(result, Err(VaultError::NotOwner));
    }

    #[test]
    fn test_withdraw_insufficient_balance() {
        let mut f = setup();
        fund_token(&mut f, owner(), 10);
        f.vault.deposit_asset(owner(), f.usdc, 10, &f.whitelist, &mut f.host).unwrap();
        let result = f.vault.withdraw(owner(), f.usdc, 11, owner(), &mut f.host);
        assert_eq!(
            result,
            Err(VaultError::InsufficientBalance {
                asset: f.usdc,
                required: 11,
                available: 10
            })
        );
    }

    #[test]
    fn test_withdraw_allowed_while_paused_and_after_delisting() {
        let mut f = setup();
        fund_token(&mut f, owner(), 10);
        f.vault.deposit_asset(owner(), f.usdc, 10, &f.whitelist, &mut f.host).unwrap();
        f.whitelist.remove(owner(), f.usdc, &mut f.host).unwrap();
        f.vault.pause(owner(), &mut f.host).unwrap();

        f.vault.withdraw(owner(), f.usdc, 10, owner(), &mut f.host).unwrap();
        assert_eq!(f.host.balance_of(f.usdc, owner()), 10);
    }

    // ─── Push tests ───

    #[test]
    fn test_push_requires_router() {
        let mut f = setup();
        f.host.fund_native(f.vault.address(), 100).unwrap();
        let result = f.vault.push_settlement_asset(owner(), 10, owner(), &mut f.host);
        assert_eq!(result, Err(VaultError::NotRouter));
    }

    #[test]
    fn test_push_uses_raw_balance() {
        let mut f = setup();
        f.host.fund_native(f.vault.address(), 100).unwrap();
        let dest = Address::from_label("dest");
        f.vault.push_settlement_asset(router(), 60, dest, &mut f.host).unwrap();
        assert_eq!(f.host.native_balance(dest), 60);

        let result = f.vault.push_settlement_asset(router(), 41, dest, &mut f.host);
        assert_eq!(
            result,
            Err(VaultError::InsufficientBalance {
                asset: Address::NATIVE,
                required: 41,
                available: 40
            })
        );
    }

    #[test]
    fn test_push_blocked_while_paused_or_retired() {
        let mut f = setup();
        f.host.fund_native(f.vault.address(), 100).unwrap();
        let dest = Address::from_label("dest");
        f.vault.pause(owner(), &mut f.host).unwrap();
        assert_eq!(
            f.vault.push_settlement_asset(router(), 1, dest, &mut f.host),
            Err(VaultError::Paused)
        );
        f.vault.retire(registry(), &mut f.host).unwrap();
        assert_eq!(
            f.vault.push_settlement_asset(router(), 1, dest, &mut f.host),
            Err(VaultError::Retired)
        );
    }

    #[derive(Debug)]
    struct Reenter;

    impl SettlementReceiver for Reenter {
        fn on_settlement(&self, ctx: &mut SettlementContext<'_>) -> Result<(), VaultError> {
            let router = ctx.vault.router().unwrap_or_default();
            ctx.vault
                .push_settlement_asset(router, ctx.amount, ctx.recipient, ctx.host)
        }
    }

    #[test]
    fn test_push_reentry_rejected_and_guard_released() {
        let mut f = setup();
        f.host.fund_native(f.vault.address(), 100).unwrap();
        let attacker = Address::from_label("attacker");
        f.host.set_receiver(attacker, Arc::new(Reenter));

        let result = f.vault.push_settlement_asset(router(), 10, attacker, &mut f.host);
        assert_eq!(result, Err(VaultError::Reentrancy));

        // Guard released: a plain push still works.
        f.vault
            .push_settlement_asset(router(), 10, Address::from_label("honest"), &mut f.host)
            .unwrap();
    }

    // ─── Pause tests ───

    #[test]
    fn test_pause_unauthorized() {
        let mut f = setup();
        let result = f.vault.pause(Address::from_label("eve"), &mut f.host);
        assert_eq!(result, Err(VaultError::NotOwner));
    }

    #[test]
    fn test_pause_unpause_cycle() {
        let mut f = setup();
        f.vault.pause(owner(), &mut f.host).unwrap();
        assert!(f.vault.is_paused());
        assert_eq!(f.vault.pause(owner(), &mut f.host), Err(VaultError::Paused));
        f.vault.unpause(owner(), &mut f.host).unwrap();
        assert!(f.vault.is_active());
        assert_eq!(f.vault.unpause(owner(), &mut f.host), Err(VaultError::NotPaused));
    }

    #[test]
    fn test_retire_only_by_registry() {
        let mut f = setup();
        assert_eq!(f.vault.retire(owner(), &mut f.host), Err(VaultError::NotRegistry));
        f.vault.retire(registry(), &mut f.host).unwrap();
        assert!(f.vault.is_retired());
        assert_eq!(f.vault.pause(owner(), &mut f.host), Err(VaultError::Retired));
    }

    // ─── Emergency recovery tests ───

    #[test]
    fn test_emergency_recover_requires_pause() {
        let mut f = setup();
        f.host.fund_native(f.vault.address(), 50).unwrap();
        let result = f.vault.emergency_recover(owner(), Address::NATIVE, 10, owner(), &mut f.host);
        assert_eq!(result, Err(VaultError::NotPaused));
    }

    #[test]
    fn test_emergency_recover_surplus_only() {
        let mut f = setup();
        fund_token(&mut f, owner(), 100);
        f.vault.deposit_asset(owner(), f.usdc, 100, &f.whitelist, &mut f.host).unwrap();
        // Stray tokens sent straight to the vault are surplus.
        f.host.mint(f.usdc, f.vault.address(), 25).unwrap();
        f.vault.pause(owner(), &mut f.host).unwrap();

        assert_eq!(f.vault.surplus(f.usdc, &f.host), 25);
        assert_eq!(
            f.vault.emergency_recover(owner(), f.usdc, 26, owner(), &mut f.host),
            Err(VaultError::InsufficientBalance {
                asset: f.usdc,
                required: 26,
                available: 25
            })
        );
        f.vault.emergency_recover(owner(), f.usdc, 25, owner(), &mut f.host).unwrap();
        assert_eq!(f.vault.total_deposited(f.usdc), 100);
        assert_eq!(f.host.balance_of(f.usdc, f.vault.address()), 100);
    }

    // ─── Configuration tests ───

    #[test]
    fn test_set_router_by_owner_or_registry() {
        let mut f = setup();
        let new_router = Address::from_label("router-2");
        f.vault.set_router(owner(), new_router).unwrap();
        assert_eq!(f.vault.router(), Some(new_router));
        f.vault.set_router(registry(), router()).unwrap();
        assert_eq!(f.vault.router(), Some(router()));
        assert_eq!(
            f.vault.set_router(Address::from_label("eve"), new_router),
            Err(VaultError::NotOwner)
        );
    }
}
