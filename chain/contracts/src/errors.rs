//! Contract-specific error types
//!
//! Error taxonomy for the host ledger, whitelist, vault, registry, pricing,
//! router and approval operations. Outer operations wrap the errors of the
//! components they call through `#[from]`.

use thiserror::Error;
use types::errors::MathError;
use types::ids::Address;
use types::numeric::Amount;

/// Failures of the host's asset transfer interface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Unknown token: {token}")]
    UnknownToken { token: Address },

    #[error("Token already deployed at {token}")]
    TokenExists { token: Address },

    #[error("Insufficient balance of {asset} held by {holder}: required {required}, available {available}")]
    InsufficientBalance {
        asset: Address,
        holder: Address,
        required: Amount,
        available: Amount,
    },

    #[error("Insufficient allowance for {spender}: required {required}, available {available}")]
    InsufficientAllowance {
        spender: Address,
        required: Amount,
        available: Amount,
    },

    #[error("Arithmetic overflow in transfer")]
    Overflow,
}

/// Asset whitelist errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WhitelistError {
    #[error("Invalid asset identifier")]
    InvalidIdentifier,

    #[error("Asset has no contract code: {asset}")]
    NotAContract { asset: Address },

    #[error("Asset already listed: {asset}")]
    AlreadyListed { asset: Address },

    #[error("Asset not listed: {asset}")]
    NotListed { asset: Address },

    #[error("Batch too large: {len} items, maximum {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("Offset {offset} out of range for {count} listed assets")]
    OutOfRange { offset: usize, count: usize },

    #[error("Unauthorized: caller is not the whitelist owner")]
    Unauthorized,
}

/// Vault-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Amount must be positive")]
    ZeroAmount,

    #[error("Invalid identifier")]
    InvalidIdentifier,

    #[error("Asset not whitelisted: {asset}")]
    NotWhitelisted { asset: Address },

    #[error("Vault is bound to a different whitelist")]
    WhitelistMismatch,

    #[error("Vault is paused")]
    Paused,

    #[error("Vault is not paused")]
    NotPaused,

    #[error("Vault is retired")]
    Retired,

    #[error("Reentrancy detected")]
    Reentrancy,

    #[error("Insufficient balance for {asset}: required {required}, available {available}")]
    InsufficientBalance {
        asset: Address,
        required: Amount,
        available: Amount,
    },

    #[error("Unauthorized: caller is not the vault owner")]
    NotOwner,

    #[error("Unauthorized: caller is not the designated router")]
    NotRouter,

    #[error("Unauthorized: caller is not the registry")]
    NotRegistry,

    #[error("Settlement receiver rejected the transfer: {reason}")]
    ReceiverRejected { reason: String },

    #[error("Arithmetic overflow in balance calculation")]
    Overflow,

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

/// Vault registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid identifier")]
    InvalidIdentifier,

    #[error("No vault implementation configured")]
    NoImplementation,

    #[error("Vault already registered: {vault}")]
    AlreadyRegistered { vault: Address },

    #[error("Unknown vault: {vault}")]
    UnknownVault { vault: Address },

    #[error("Insufficient aggregate balance: required {required}, available {available}")]
    InsufficientAggregateBalance { required: Amount, available: Amount },

    #[error("Needs rebalancing: required {required}, largest vault holds {largest}, aggregate {aggregate}")]
    NeedsRebalancing {
        required: Amount,
        largest: Amount,
        aggregate: Amount,
    },

    #[error("Array length mismatch: {targets} targets, {balances} balances")]
    LengthMismatch { targets: usize, balances: usize },

    #[error("Vault {vault} is both a rebalance source and target")]
    SourceIsTarget { vault: Address },

    #[error("Invalid thresholds: lower {lower}, target {target}, upper {upper}")]
    InvalidThresholds {
        lower: Amount,
        target: Amount,
        upper: Amount,
    },

    #[error("Unauthorized: caller is not the registry admin")]
    Unauthorized,

    #[error("Arithmetic overflow in reserve calculation")]
    Overflow,

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),
}

/// Price conversion errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    #[error("Amount must be positive")]
    ZeroAmount,

    #[error("Asset not supported: {asset}")]
    NotSupported { asset: Address },

    #[error("Stale price: updated at {updated_at}, now {now}")]
    StalePrice { updated_at: u64, now: u64 },

    #[error("Invalid price: {price}")]
    InvalidPrice { price: i128 },

    #[error("Invalid price round")]
    InvalidRound,

    #[error("Unsupported decimals: asset {asset_decimals}, feed {feed_decimals}")]
    UnsupportedDecimals { asset_decimals: u8, feed_decimals: u8 },

    #[error("Arithmetic overflow in price conversion")]
    Overflow,
}

impl From<MathError> for PriceError {
    fn from(_: MathError) -> Self {
        PriceError::Overflow
    }
}

/// Signed-approval errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("No signing key registered for {owner}")]
    UnknownSigner { owner: Address },

    #[error("Invalid signature for approval")]
    InvalidSignature,

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

/// Exchange router errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Amount must be positive")]
    ZeroAmount,

    #[error("Asset not supported: {asset}")]
    NotSupported { asset: Address },

    #[error("Invalid identifier")]
    InvalidIdentifier,

    #[error("Destination cannot be the router itself")]
    InvalidDestination,

    #[error("Amount {amount} below minimum {minimum}")]
    BelowMinimum { amount: Amount, minimum: Amount },

    #[error("Amount {amount} above maximum {maximum}")]
    AboveMaximum { amount: Amount, maximum: Amount },

    #[error("Invalid deposit bounds: minimum {minimum}, maximum {maximum}")]
    InvalidBounds { minimum: Amount, maximum: Amount },

    #[error("Rate limit exceeded: {limit} swaps in period {period}")]
    RateLimitExceeded { period: u64, limit: u32 },

    #[error("Authorization expired at {deadline}, now {now}")]
    ExpiredAuthorization { deadline: u64, now: u64 },

    #[error("Unauthorized: caller is not the router owner")]
    Unauthorized,

    #[error("Price error: {0}")]
    Price(#[from] PriceError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },

    #[error("Malformed configuration: {reason}")]
    Malformed { reason: String },
}

/// Top-level error for operations dispatched through the chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Whitelist error: {0}")]
    Whitelist(#[from] WhitelistError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Router error: {0}")]
    Router(#[from] RouterError),

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
