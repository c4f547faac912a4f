//! Vault registry: creation, lookup and cross-vault reserve management
//!
//! The registry is the only way a vault comes into existence. It tracks the
//! global vault set and an owner → vaults multimap (insertion order kept, so
//! the last entry is the owner's most recent vault), and runs the algorithms
//! that span vaults:
//!
//! - Best-fit search for a vault able to cover a settlement amount
//! - Greedy reserve rebalancing with a source cursor, best effort
//! - Threshold-driven automatic rebalancing
//! - Batch administration returning one result per item

use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use types::ids::Address;
use types::numeric::Amount;

use crate::errors::{RegistryError, VaultError};
use crate::events::{ContractEvent, Rebalanced, VaultCreated, VaultOwnershipTransferred};
use crate::host::Host;
use crate::security::AccessControl;
use crate::vault::Vault;

/// Template new vaults are instantiated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultTemplate {
    pub version: u32,
    /// Router designated on every vault created from this template
    pub default_router: Option<Address>,
}

/// One reserve movement performed by a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveTransfer {
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
}

/// Outcome of a rebalance. Partial completion is reported, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalanceReport {
    /// Sum of all target deficits
    pub requested: Amount,
    /// Amount actually moved
    pub moved: Amount,
    pub transfers: Vec<ReserveTransfer>,
    /// Sources skipped because their transfer failed
    pub failures: Vec<(Address, VaultError)>,
}

impl RebalanceReport {
    pub fn is_complete(&self) -> bool {
        self.moved == self.requested
    }
}

/// Per-item results of a batch administrative operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub results: Vec<(Address, Result<(), RegistryError>)>,
}

impl BatchOutcome {
    /// Number of items that succeeded.
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &(Address, Result<(), RegistryError>)> {
        self.results.iter().filter(|(_, r)| r.is_err())
    }
}

/// Registry of every vault in the system.
#[derive(Debug, Clone)]
pub struct VaultRegistry {
    address: Address,
    access_control: AccessControl,
    /// Whitelist bound into newly created vaults
    whitelist: Address,
    implementation: Option<VaultTemplate>,
    vaults: BTreeMap<Address, Vault>,
    /// Global set, creation order
    all: Vec<Address>,
    by_owner: BTreeMap<Address, Vec<Address>>,
    nonce: u64,
}

impl VaultRegistry {
    pub fn new(address: Address, admin: Address, whitelist: Address) -> Self {
        Self {
            address,
            access_control: AccessControl::new(admin),
            whitelist,
            implementation: None,
            vaults: BTreeMap::new(),
            all: Vec::new(),
            by_owner: BTreeMap::new(),
            nonce: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn admin(&self) -> Address {
        self.access_control.owner()
    }

    pub fn whitelist(&self) -> Address {
        self.whitelist
    }

    pub fn implementation(&self) -> Option<VaultTemplate> {
        self.implementation
    }

    // ───────────────────────── Administration ─────────────────────────

    /// Configure the template new vaults are created from. Admin-only.
    pub fn set_implementation(&mut self, caller: Address, template: VaultTemplate) -> Result<(), RegistryError> {
        self.require_admin(caller)?;
        if template.default_router.is_some_and(|r| r.is_zero()) {
            return Err(RegistryError::InvalidIdentifier);
        }
        self.implementation = Some(template);
        info!(version = template.version, "Vault implementation updated");
        Ok(())
    }

    /// Whitelist bound into vaults created from now on. Admin-only.
    pub fn set_whitelist(&mut self, caller: Address, whitelist: Address) -> Result<(), RegistryError> {
        self.require_admin(caller)?;
        if whitelist.is_zero() {
            return Err(RegistryError::InvalidIdentifier);
        }
        self.whitelist = whitelist;
        Ok(())
    }

    pub fn transfer_admin(&mut self, caller: Address, new_admin: Address) -> Result<(), RegistryError> {
        if !self.access_control.transfer_ownership(caller, new_admin) {
            return Err(RegistryError::Unauthorized);
        }
        Ok(())
    }

    // ───────────────────────── Creation ─────────────────────────

    /// Create a vault owned by `owner`. Open to any caller.
    pub fn create_vault(&mut self, caller: Address, owner: Address, host: &mut Host) -> Result<Address, RegistryError> {
        if owner.is_zero() {
            return Err(RegistryError::InvalidIdentifier);
        }
        let template = self.implementation.ok_or(RegistryError::NoImplementation)?;

        let address = self.next_vault_address();
        if self.vaults.contains_key(&address) || host.has_code(address) {
            return Err(RegistryError::AlreadyRegistered { vault: address });
        }

        let vault = Vault::new(
            address,
            owner,
            self.address,
            self.whitelist,
            template.default_router,
            template.version,
        );
        // Every check is done; the three insertions below cannot fail.
        self.nonce += 1;
        self.vaults.insert(address, vault);
        self.all.push(address);
        self.by_owner.entry(owner).or_default().push(address);
        host.register_code(address);

        host.emit(ContractEvent::VaultCreated(VaultCreated {
            vault: address,
            owner,
            creator: caller,
            template_version: template.version,
        }));
        info!(vault = %address.short(), owner = %owner.short(), version = template.version, "Vault created");
        Ok(address)
    }

    fn next_vault_address(&self) -> Address {
        let mut seed = Vec::with_capacity(6 + 20 + 8);
        seed.extend_from_slice(b"vault:");
        seed.extend_from_slice(self.address.as_bytes());
        seed.extend_from_slice(&self.nonce.to_be_bytes());
        Address::derive(&seed)
    }

    // ───────────────────────── Lookup ─────────────────────────

    pub fn vault(&self, vault: Address) -> Result<&Vault, RegistryError> {
        self.vaults.get(&vault).ok_or(RegistryError::UnknownVault { vault })
    }

    pub fn vault_mut(&mut self, vault: Address) -> Result<&mut Vault, RegistryError> {
        self.vaults.get_mut(&vault).ok_or(RegistryError::UnknownVault { vault })
    }

    pub fn contains(&self, vault: Address) -> bool {
        self.vaults.contains_key(&vault)
    }

    /// Vaults owned by `owner`, oldest first.
    pub fn vaults_of(&self, owner: Address) -> &[Address] {
        self.by_owner.get(&owner).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The owner's most recently created (or acquired) vault.
    pub fn latest_vault_of(&self, owner: Address) -> Option<Address> {
        self.vaults_of(owner).last().copied()
    }

    /// Every vault, creation order.
    pub fn all_vaults(&self) -> &[Address] {
        &self.all
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Settlement reserve held across all vaults.
    pub fn total_reserves(&self, host: &Host) -> Amount {
        host.total_native(&self.all)
    }

    /// Settlement reserve held across `owner`'s vaults.
    pub fn reserves_of(&self, owner: Address, host: &Host) -> Amount {
        host.total_native(self.vaults_of(owner))
    }

    // ───────────────────────── Ownership / retirement ─────────────────────────

    /// Move a vault to `new_owner`. Callable by the vault's owner or the admin.
    pub fn transfer_vault_ownership(
        &mut self,
        caller: Address,
        vault: Address,
        new_owner: Address,
        host: &mut Host,
    ) -> Result<(), RegistryError> {
        if new_owner.is_zero() {
            return Err(RegistryError::InvalidIdentifier);
        }
        let previous_owner = self.vault(vault)?.owner();
        if caller != previous_owner && !self.access_control.is_owner(caller) {
            return Err(RegistryError::Unauthorized);
        }
        if previous_owner == new_owner {
            return Ok(());
        }

        if let Some(owned) = self.by_owner.get_mut(&previous_owner) {
            owned.retain(|v| *v != vault);
            if owned.is_empty() {
                self.by_owner.remove(&previous_owner);
            }
        }
        self.by_owner.entry(new_owner).or_default().push(vault);
        self.vault_mut(vault)?.reassign_owner(new_owner);

        host.emit(ContractEvent::VaultOwnershipTransferred(VaultOwnershipTransferred {
            vault,
            previous_owner,
            new_owner,
        }));
        info!(vault = %vault.short(), from = %previous_owner.short(), to = %new_owner.short(), "Vault ownership transferred");
        Ok(())
    }

    /// Retire a vault. Callable by the vault's owner or the admin.
    pub fn retire_vault(&mut self, caller: Address, vault: Address, host: &mut Host) -> Result<(), RegistryError> {
        let owner = self.vault(vault)?.owner();
        if caller != owner && !self.access_control.is_owner(caller) {
            return Err(RegistryError::Unauthorized);
        }
        let registry = self.address;
        self.vault_mut(vault)?.retire(registry, host)?;
        Ok(())
    }

    // ───────────────────────── Batch administration ─────────────────────────

    /// Transfer many vaults. Admin-only; one failing item never aborts the rest.
    pub fn batch_transfer_ownership(
        &mut self,
        caller: Address,
        moves: &[(Address, Address)],
        host: &mut Host,
    ) -> Result<BatchOutcome, RegistryError> {
        self.require_admin(caller)?;
        let mut outcome = BatchOutcome::default();
        for &(vault, new_owner) in moves {
            let result = self.transfer_vault_ownership(caller, vault, new_owner, host);
            if let Err(e) = &result {
                debug!(vault = %vault.short(), reason = %e, "Batch ownership transfer item failed");
            }
            outcome.results.push((vault, result));
        }
        Ok(outcome)
    }

    /// Rebind many vaults to `whitelist`. Admin-only.
    pub fn batch_set_whitelist(
        &mut self,
        caller: Address,
        vaults: &[Address],
        whitelist: Address,
    ) -> Result<BatchOutcome, RegistryError> {
        self.require_admin(caller)?;
        let registry = self.address;
        Ok(self.for_each_vault(vaults, |vault| vault.set_whitelist(registry, whitelist)))
    }

    /// Designate `router` on many vaults. Admin-only.
    pub fn batch_set_router(
        &mut self,
        caller: Address,
        vaults: &[Address],
        router: Address,
    ) -> Result<BatchOutcome, RegistryError> {
        self.require_admin(caller)?;
        let registry = self.address;
        Ok(self.for_each_vault(vaults, |vault| vault.set_router(registry, router)))
    }

    fn for_each_vault(
        &mut self,
        vaults: &[Address],
        mut op: impl FnMut(&mut Vault) -> Result<(), VaultError>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for &address in vaults {
            let result = match self.vaults.get_mut(&address) {
                Some(vault) => op(vault).map_err(RegistryError::from),
                None => Err(RegistryError::UnknownVault { vault: address }),
            };
            if let Err(e) = &result {
                debug!(vault = %address.short(), reason = %e, "Batch item failed");
            }
            outcome.results.push((address, result));
        }
        outcome
    }

    // ───────────────────────── Best-fit search ─────────────────────────

    /// Find one of `owner`'s vaults able to push `required` settlement asset.
    ///
    /// The most recent vault is tried first, then the rest in creation order,
    /// returning the first with enough reserve. Paused and retired vaults are
    /// not candidates. When none suffices the error says whether the owner's
    /// reserve is short overall or only fragmented.
    pub fn find_best_vault(&self, owner: Address, required: Amount, host: &Host) -> Result<Address, RegistryError> {
        let owned = self.vaults_of(owner);
        let candidates: Vec<Address> = owned
            .iter()
            .copied()
            .filter(|v| self.vaults.get(v).is_some_and(Vault::is_active))
            .collect();

        let Some((&latest, rest)) = candidates.split_last() else {
            return Err(RegistryError::InsufficientAggregateBalance {
                required,
                available: 0,
            });
        };

        let latest_balance = host.native_balance(latest);
        if latest_balance >= required {
            return Ok(latest);
        }

        let mut largest = latest_balance;
        let mut aggregate = latest_balance;
        for &vault in rest {
            let balance = host.native_balance(vault);
            if balance >= required {
                debug!(vault = %vault.short(), balance, required, "Best-fit vault found by scan");
                return Ok(vault);
            }
            largest = largest.max(balance);
            aggregate = aggregate.checked_add(balance).ok_or(RegistryError::Overflow)?;
        }

        if aggregate < required {
            Err(RegistryError::InsufficientAggregateBalance {
                required,
                available: aggregate,
            })
        } else {
            Err(RegistryError::NeedsRebalancing {
                required,
                largest,
                aggregate,
            })
        }
    }

    // ───────────────────────── Rebalancing ─────────────────────────

    /// Top up `targets` to `target_balances` from `sources`. Admin-only.
    ///
    /// Targets are served in order from a source cursor. A failed transfer
    /// skips to the next source instead of aborting, so the report may show
    /// less moved than requested.
    pub fn rebalance(
        &mut self,
        caller: Address,
        sources: &[Address],
        targets: &[Address],
        target_balances: &[Amount],
        host: &mut Host,
    ) -> Result<RebalanceReport, RegistryError> {
        self.require_admin(caller)?;
        if targets.len() != target_balances.len() {
            return Err(RegistryError::LengthMismatch {
                targets: targets.len(),
                balances: target_balances.len(),
            });
        }
        for &vault in sources.iter().chain(targets) {
            if !self.contains(vault) {
                return Err(RegistryError::UnknownVault { vault });
            }
        }
        if let Some(&vault) = sources.iter().find(|s| targets.contains(*s)) {
            return Err(RegistryError::SourceIsTarget { vault });
        }

        let capacities: Vec<(Address, Amount)> = sources
            .iter()
            .map(|&s| (s, host.native_balance(s)))
            .collect();
        self.move_reserves(caller, &capacities, targets, target_balances, host)
    }

    /// Rebalance every active vault against thresholds. Admin-only.
    ///
    /// Vaults above `upper` are sources, vaults below `lower` are topped up
    /// to `target`. Sources offer their whole balance, as in [`Self::rebalance`].
    pub fn auto_rebalance(
        &mut self,
        caller: Address,
        lower: Amount,
        target: Amount,
        upper: Amount,
        host: &mut Host,
    ) -> Result<RebalanceReport, RegistryError> {
        self.require_admin(caller)?;
        if lower >= upper || target <= lower || target >= upper {
            return Err(RegistryError::InvalidThresholds { lower, target, upper });
        }

        let mut sources = Vec::new();
        let mut targets = Vec::new();
        for &vault in &self.all {
            if !self.vaults.get(&vault).is_some_and(Vault::is_active) {
                continue;
            }
            let balance = host.native_balance(vault);
            if balance > upper {
                sources.push((vault, balance));
            } else if balance < lower {
                targets.push(vault);
            }
        }
        let target_balances = vec![target; targets.len()];
        debug!(sources = sources.len(), targets = targets.len(), "Auto-rebalance plan");
        self.move_reserves(caller, &sources, &targets, &target_balances, host)
    }

    fn move_reserves(
        &mut self,
        caller: Address,
        sources: &[(Address, Amount)],
        targets: &[Address],
        target_balances: &[Amount],
        host: &mut Host,
    ) -> Result<RebalanceReport, RegistryError> {
        let mut deficits = Vec::with_capacity(targets.len());
        let mut requested: Amount = 0;
        for (&vault, &wanted) in targets.iter().zip(target_balances) {
            let deficit = wanted.saturating_sub(host.native_balance(vault));
            requested = requested.checked_add(deficit).ok_or(RegistryError::Overflow)?;
            deficits.push((vault, deficit));
        }
        let mut available: Amount = 0;
        for &(_, capacity) in sources {
            available = available.checked_add(capacity).ok_or(RegistryError::Overflow)?;
        }
        if available < requested {
            return Err(RegistryError::InsufficientAggregateBalance {
                required: requested,
                available,
            });
        }

        let registry = self.address;
        let mut report = RebalanceReport {
            requested,
            ..RebalanceReport::default()
        };
        let mut remaining_capacity: Vec<Amount> = sources.iter().map(|&(_, c)| c).collect();
        let mut cursor = 0;

        for (target, mut deficit) in deficits {
            while deficit > 0 && cursor < sources.len() {
                let source = sources[cursor].0;
                let spendable = remaining_capacity[cursor].min(host.native_balance(source));
                if spendable == 0 {
                    cursor += 1;
                    continue;
                }
                let amount = spendable.min(deficit);
                let result = match self.vaults.get_mut(&source) {
                    Some(vault) => vault.release_reserve(registry, amount, target, host),
                    None => Err(VaultError::InvalidIdentifier),
                };
                match result {
                    Ok(()) => {
                        deficit -= amount;
                        report.moved += amount;
                        remaining_capacity[cursor] -= amount;
                        report.transfers.push(ReserveTransfer {
                            from: source,
                            to: target,
                            amount,
                        });
                        if remaining_capacity[cursor] == 0 {
                            cursor += 1;
                        }
                    }
                    Err(e) => {
                        warn!(source = %source.short(), target = %target.short(), amount, reason = %e, "Rebalance transfer failed, advancing to next source");
                        report.failures.push((source, e));
                        cursor += 1;
                    }
                }
            }
        }

        host.emit(ContractEvent::Rebalanced(Rebalanced {
            actor: caller,
            requested: report.requested,
            moved: report.moved,
        }));
        if report.is_complete() {
            info!(moved = report.moved, "Rebalance complete");
        } else {
            warn!(requested = report.requested, moved = report.moved, "Rebalance partially complete");
        }
        Ok(report)
    }

    fn require_admin(&self, caller: Address) -> Result<(), RegistryError> {
        if !self.access_control.is_owner(caller) {
            return Err(RegistryError::Unauthorized);
        }
        Ok(())
    }
}
