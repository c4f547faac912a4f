//! Host: the execution environment the contracts run inside
//!
//! The custody core assumes a host that provides durable keyed storage,
//! a clock, asset transfers and an event log. This module models that
//! environment explicitly:
//! - Clock: block height (the rate-limit period key) and unix timestamp
//! - Native settlement-asset balances
//! - Fungible token ledgers with allowances and optional transfer fees
//! - The set of addresses carrying contract code
//! - Settlement receivers: code that runs when an address receives native value
//! - Append-only event log
//!
//! Atomicity is provided one level up by `Chain::transact`, which snapshots
//! the host together with every contract.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;
use types::ids::Address;
use types::numeric::Amount;

use crate::errors::TransferError;
use crate::events::ContractEvent;
use crate::vault::SettlementReceiver;

/// Basis-point denominator for transfer fees.
pub const BPS_DENOMINATOR: Amount = 10_000;

/// A fungible token deployed on the host.
#[derive(Debug, Clone)]
pub struct TokenLedger {
    symbol: String,
    decimals: u8,
    /// Fee charged on every transfer, burned, in basis points.
    fee_bps: u16,
    total_supply: Amount,
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<(Address, Address), Amount>,
}

impl TokenLedger {
    fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            fee_bps: 0,
            total_supply: 0,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    fn balance(&self, holder: Address) -> Amount {
        self.balances.get(&holder).copied().unwrap_or(0)
    }

    /// Move `amount` out of `from`; `to` receives `amount` minus the fee.
    fn move_balance(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<Amount, TransferError> {
        let available = self.balance(from);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                asset: token,
                holder: from,
                required: amount,
                available,
            });
        }
        let fee = amount
            .checked_mul(self.fee_bps as Amount)
            .ok_or(TransferError::Overflow)?
            / BPS_DENOMINATOR;
        let received = amount - fee;

        if from == to {
            self.balances.insert(from, available - fee);
        } else {
            let credited = self
                .balance(to)
                .checked_add(received)
                .ok_or(TransferError::Overflow)?;
            self.balances.insert(from, available - amount);
            self.balances.insert(to, credited);
        }
        self.total_supply -= fee;
        Ok(received)
    }
}

/// The execution environment.
#[derive(Debug, Clone, Default)]
pub struct Host {
    block_height: u64,
    timestamp: u64,
    native: BTreeMap<Address, Amount>,
    tokens: BTreeMap<Address, TokenLedger>,
    code: BTreeSet<Address>,
    receivers: BTreeMap<Address, Arc<dyn SettlementReceiver>>,
    log: Vec<ContractEvent>,
}

impl Host {
    /// Create a host at the given block height and timestamp.
    pub fn new(block_height: u64, timestamp: u64) -> Self {
        Self {
            block_height,
            timestamp,
            ..Self::default()
        }
    }

    // ───────────────────────── Clock ─────────────────────────

    /// Current block height. Used as the rate-limit period key.
    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    /// Current unix timestamp in seconds.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Advance the clock by `blocks` blocks and `seconds` seconds.
    pub fn advance(&mut self, blocks: u64, seconds: u64) {
        self.block_height = self.block_height.saturating_add(blocks);
        self.timestamp = self.timestamp.saturating_add(seconds);
    }

    // ───────────────────────── Contract code ─────────────────────────

    /// Mark an address as carrying contract code.
    pub fn register_code(&mut self, address: Address) {
        self.code.insert(address);
    }

    /// Whether an address carries contract code.
    pub fn has_code(&self, address: Address) -> bool {
        self.code.contains(&address)
    }

    // ───────────────────────── Fungible tokens ─────────────────────────

    /// Deploy a token at a deterministic address derived from its symbol.
    pub fn deploy_token(&mut self, symbol: &str, decimals: u8) -> Address {
        let mut seed = b"token:".to_vec();
        seed.extend_from_slice(symbol.as_bytes());
        seed.extend_from_slice(&(self.tokens.len() as u64).to_be_bytes());
        let address = Address::derive(&seed);
        self.tokens.insert(address, TokenLedger::new(symbol, decimals));
        self.code.insert(address);
        debug!(token = %address.short(), symbol, decimals, "Token deployed");
        address
    }

    /// Deploy a token at a chosen address.
    pub fn deploy_token_at(
        &mut self,
        address: Address,
        symbol: &str,
        decimals: u8,
    ) -> Result<(), TransferError> {
        if self.tokens.contains_key(&address) {
            return Err(TransferError::TokenExists { token: address });
        }
        self.tokens.insert(address, TokenLedger::new(symbol, decimals));
        self.code.insert(address);
        Ok(())
    }

    pub fn token(&self, token: Address) -> Option<&TokenLedger> {
        self.tokens.get(&token)
    }

    fn token_mut(&mut self, token: Address) -> Result<&mut TokenLedger, TransferError> {
        self.tokens
            .get_mut(&token)
            .ok_or(TransferError::UnknownToken { token })
    }

    /// Decimals reported by a token.
    pub fn decimals(&self, token: Address) -> Result<u8, TransferError> {
        self.tokens
            .get(&token)
            .map(TokenLedger::decimals)
            .ok_or(TransferError::UnknownToken { token })
    }

    /// Change the decimals a token reports.
    pub fn set_decimals(&mut self, token: Address, decimals: u8) -> Result<(), TransferError> {
        self.token_mut(token)?.decimals = decimals;
        Ok(())
    }

    /// Charge a fee (burned) on every transfer of `token`.
    pub fn set_transfer_fee(&mut self, token: Address, fee_bps: u16) -> Result<(), TransferError> {
        self.token_mut(token)?.fee_bps = fee_bps.min(BPS_DENOMINATOR as u16);
        Ok(())
    }

    /// Mint new supply to `to`.
    pub fn mint(&mut self, token: Address, to: Address, amount: Amount) -> Result<(), TransferError> {
        let ledger = self.token_mut(token)?;
        let supply = ledger
            .total_supply
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        let balance = ledger
            .balance(to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        ledger.total_supply = supply;
        ledger.balances.insert(to, balance);
        Ok(())
    }

    /// Token balance of `holder`. Unknown tokens report zero.
    pub fn balance_of(&self, token: Address, holder: Address) -> Amount {
        self.tokens
            .get(&token)
            .map(|ledger| ledger.balance(holder))
            .unwrap_or(0)
    }

    /// Set `spender`'s allowance over `owner`'s balance.
    pub fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.token_mut(token)?
            .allowances
            .insert((owner, spender), amount);
        Ok(())
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> Amount {
        self.tokens
            .get(&token)
            .and_then(|ledger| ledger.allowances.get(&(owner, spender)).copied())
            .unwrap_or(0)
    }

    /// Transfer from `from`'s own balance. Returns the amount `to` received.
    pub fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<Amount, TransferError> {
        self.token_mut(token)?.move_balance(token, from, to, amount)
    }

    /// Transfer on behalf of `from`, consuming `spender`'s allowance.
    /// Returns the amount `to` received.
    pub fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<Amount, TransferError> {
        let ledger = self.token_mut(token)?;
        let allowed = ledger
            .allowances
            .get(&(from, spender))
            .copied()
            .unwrap_or(0);
        if allowed < amount {
            return Err(TransferError::InsufficientAllowance {
                spender,
                required: amount,
                available: allowed,
            });
        }
        let received = ledger.move_balance(token, from, to, amount)?;
        ledger.allowances.insert((from, spender), allowed - amount);
        Ok(received)
    }

    // ───────────────────────── Native settlement asset ─────────────────────────

    pub fn native_balance(&self, holder: Address) -> Amount {
        self.native.get(&holder).copied().unwrap_or(0)
    }

    /// Credit native value out of thin air. Genesis allocations and tests.
    pub fn fund_native(&mut self, to: Address, amount: Amount) -> Result<(), TransferError> {
        let balance = self
            .native_balance(to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        self.native.insert(to, balance);
        Ok(())
    }

    /// Move native value. Does not run the recipient's receiver; callers
    /// that hand control to the recipient do so explicitly afterwards.
    pub fn transfer_native(
        &mut self,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let available = self.native_balance(from);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                asset: Address::NATIVE,
                holder: from,
                required: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .native_balance(to)
            .checked_add(amount)
            .ok_or(TransferError::Overflow)?;
        self.native.insert(from, available - amount);
        self.native.insert(to, credited);
        Ok(())
    }

    /// Balance of either the native asset or a token.
    pub fn asset_balance(&self, asset: Address, holder: Address) -> Amount {
        if asset.is_native() {
            self.native_balance(holder)
        } else {
            self.balance_of(asset, holder)
        }
    }

    /// Sum of native balances across `holders`.
    pub fn total_native(&self, holders: &[Address]) -> Amount {
        holders
            .iter()
            .map(|h| self.native_balance(*h))
            .fold(0, Amount::saturating_add)
    }

    // ───────────────────────── Receivers ─────────────────────────

    /// Install code that runs whenever `address` receives native value.
    pub fn set_receiver(&mut self, address: Address, receiver: Arc<dyn SettlementReceiver>) {
        self.code.insert(address);
        self.receivers.insert(address, receiver);
    }

    pub fn receiver(&self, address: Address) -> Option<Arc<dyn SettlementReceiver>> {
        self.receivers.get(&address).cloned()
    }

    // ───────────────────────── Events ─────────────────────────

    /// Append an event to the log.
    pub fn emit(&mut self, event: ContractEvent) {
        debug!(event = event.label(), "Event emitted");
        self.log.push(event);
    }

    /// Get all emitted events.
    pub fn events(&self) -> &[ContractEvent] {
        &self.log
    }

    /// Detach the log, leaving it empty. Paired with [`Host::restore_log`].
    pub(crate) fn take_log(&mut self) -> Vec<ContractEvent> {
        std::mem::take(&mut self.log)
    }

    pub(crate) fn restore_log(&mut self, log: Vec<ContractEvent>) {
        self.log = log;
    }

    /// Drain all events (consume and clear).
    pub fn drain_events(&mut self) -> Vec<ContractEvent> {
        std::mem::take(&mut self.log)
    }
}
