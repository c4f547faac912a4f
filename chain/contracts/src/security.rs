//! Shared security primitives for contract modules
//!
//! Provides reusable guards and access control used across the whitelist,
//! vault, registry, router and approval modules.

use std::collections::BTreeMap;
use types::ids::Address;

/// Reentrancy guard preventing nested calls into protected functions.
///
/// A contract function acquires the guard before executing state-changing
/// logic and releases it on completion. Any nested call attempt fails.
/// [`ReentrancyGuard::scoped`] ties acquire and release to a closure so the
/// guard is released on every exit path, early errors included.
#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    locked: bool,
}

impl ReentrancyGuard {
    /// Create a new unlocked guard.
    pub fn new() -> Self {
        Self { locked: false }
    }

    /// Acquire the guard. Returns `true` if successfully acquired.
    /// Returns `false` if already locked (reentrancy attempt).
    pub fn acquire(&mut self) -> bool {
        if self.locked {
            return false;
        }
        self.locked = true;
        true
    }

    /// Release the guard.
    pub fn release(&mut self) {
        self.locked = false;
    }

    /// Check if currently locked.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Run `body` with the guard held by `owner`.
    ///
    /// `guard` projects the guard out of `owner`, so `body` keeps full
    /// mutable access to the owner while the lock is held. Returns
    /// `on_reentry()` without running `body` when the guard is already held.
    pub fn scoped<O, T, E>(
        owner: &mut O,
        guard: fn(&mut O) -> &mut ReentrancyGuard,
        on_reentry: impl FnOnce() -> E,
        body: impl FnOnce(&mut O) -> Result<T, E>,
    ) -> Result<T, E> {
        if !guard(&mut *owner).acquire() {
            return Err(on_reentry());
        }
        let result = body(&mut *owner);
        guard(owner).release();
        result
    }
}

/// Single-owner access control.
///
/// Owner-only operations across the crate check `is_owner(caller)` before
/// touching state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControl {
    owner: Address,
}

impl AccessControl {
    /// Create access control with an initial owner.
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    /// Check if a caller is the owner.
    pub fn is_owner(&self, caller: Address) -> bool {
        !caller.is_zero() && caller == self.owner
    }

    /// Transfer ownership. Only the current owner may transfer, and never
    /// to the null identifier.
    pub fn transfer_ownership(&mut self, current_owner: Address, new_owner: Address) -> bool {
        if !self.is_owner(current_owner) || new_owner.is_zero() {
            return false;
        }
        self.owner = new_owner;
        true
    }

    /// Replace the owner without a caller check. Used by the registry, which
    /// authorizes the move itself.
    pub(crate) fn reassign(&mut self, new_owner: Address) {
        self.owner = new_owner;
    }

    /// Get the current owner identifier.
    pub fn owner(&self) -> Address {
        self.owner
    }
}

/// Per-account sequential nonce tracker for replay protection.
///
/// Each account has a monotonically increasing nonce. A signed message is
/// only valid for the account's current nonce, and consuming it advances
/// the counter, so every signature is usable exactly once.
#[derive(Debug, Clone, Default)]
pub struct NonceTracker {
    next: BTreeMap<Address, u64>,
}

impl NonceTracker {
    /// Create a new empty tracker.
    pub fn new() -> Self {
        Self {
            next: BTreeMap::new(),
        }
    }

    /// The nonce the next message from `account` must carry.
    pub fn current(&self, account: Address) -> u64 {
        self.next.get(&account).copied().unwrap_or(0)
    }

    /// Consume the current nonce, returning the value consumed.
    pub fn consume(&mut self, account: Address) -> u64 {
        let slot = self.next.entry(account).or_insert(0);
        let used = *slot;
        *slot += 1;
        used
    }

    /// Number of accounts with at least one consumed nonce.
    pub fn count(&self) -> usize {
        self.next.len()
    }
}
