//! Contract events
//!
//! Events are immutable records appended to the host log by successful
//! operations. A reverted operation leaves no events behind. Every money
//! movement carries the actor, the asset and the amount so external
//! auditors can reconstruct it.

use serde::{Deserialize, Serialize};
use types::ids::Address;
use types::numeric::Amount;

/// Asset added to the whitelist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetListed {
    pub actor: Address,
    pub asset: Address,
}

/// Asset removed from the whitelist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDelisted {
    pub actor: Address,
    pub asset: Address,
}

/// Asset deposited into a vault and credited to the depositor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposited {
    pub vault: Address,
    pub depositor: Address,
    pub asset: Address,
    pub amount: Amount,
}

/// Asset withdrawn by the vault owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawn {
    pub vault: Address,
    pub owner: Address,
    pub asset: Address,
    pub amount: Amount,
    pub to: Address,
}

/// Settlement asset pushed out of a vault on the router's instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPushed {
    pub vault: Address,
    pub router: Address,
    pub amount: Amount,
    pub to: Address,
}

/// Vault created by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultCreated {
    pub vault: Address,
    pub owner: Address,
    pub creator: Address,
    pub template_version: u32,
}

/// Vault moved from one owner to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultOwnershipTransferred {
    pub vault: Address,
    pub previous_owner: Address,
    pub new_owner: Address,
}

/// Vault retired by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRetired {
    pub vault: Address,
    pub actor: Address,
}

/// Vault paused by its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultPaused {
    pub vault: Address,
    pub actor: Address,
}

/// Vault unpaused by its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultUnpaused {
    pub vault: Address,
    pub actor: Address,
}

/// Unallocated surplus recovered from a paused vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyRecovered {
    pub vault: Address,
    pub actor: Address,
    pub asset: Address,
    pub amount: Amount,
    pub to: Address,
}

/// Settlement reserve moved between two vaults during a rebalance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveMoved {
    pub from_vault: Address,
    pub to_vault: Address,
    pub amount: Amount,
}

/// Rebalance finished (possibly partially)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rebalanced {
    pub actor: Address,
    pub requested: Amount,
    pub moved: Amount,
}

/// Payment asset registered or updated on the router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAssetConfigured {
    pub actor: Address,
    pub asset: Address,
    pub decimals: u8,
    pub scaling_factor: Amount,
}

/// Payment asset removed from the router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAssetRemoved {
    pub actor: Address,
    pub asset: Address,
}

/// Default input asset changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultAssetSet {
    pub actor: Address,
    pub asset: Address,
}

/// Input asset exchanged for settlement asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchanged {
    pub depositor: Address,
    pub asset: Address,
    pub amount: Amount,
    pub vault: Address,
    pub settlement_amount: Amount,
    pub destination: Address,
}

/// Enum wrapper for all contract events, enabling uniform handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
    AssetListed(AssetListed),
    AssetDelisted(AssetDelisted),
    Deposited(Deposited),
    Withdrawn(Withdrawn),
    SettlementPushed(SettlementPushed),
    VaultCreated(VaultCreated),
    VaultOwnershipTransferred(VaultOwnershipTransferred),
    VaultRetired(VaultRetired),
    VaultPaused(VaultPaused),
    VaultUnpaused(VaultUnpaused),
    EmergencyRecovered(EmergencyRecovered),
    ReserveMoved(ReserveMoved),
    Rebalanced(Rebalanced),
    PaymentAssetConfigured(PaymentAssetConfigured),
    PaymentAssetRemoved(PaymentAssetRemoved),
    DefaultAssetSet(DefaultAssetSet),
    Exchanged(Exchanged),
}

impl ContractEvent {
    /// Stable label used in log fields.
    pub fn label(&self) -> &'static str {
        match self {
            ContractEvent::AssetListed(_) => "asset_listed",
            ContractEvent::AssetDelisted(_) => "asset_delisted",
            ContractEvent::Deposited(_) => "deposited",
            ContractEvent::Withdrawn(_) => "withdrawn",
            ContractEvent::SettlementPushed(_) => "settlement_pushed",
            ContractEvent::VaultCreated(_) => "vault_created",
            ContractEvent::VaultOwnershipTransferred(_) => "vault_ownership_transferred",
            ContractEvent::VaultRetired(_) => "vault_retired",
            ContractEvent::VaultPaused(_) => "vault_paused",
            ContractEvent::VaultUnpaused(_) => "vault_unpaused",
            ContractEvent::EmergencyRecovered(_) => "emergency_recovered",
            ContractEvent::ReserveMoved(_) => "reserve_moved",
            ContractEvent::Rebalanced(_) => "rebalanced",
            ContractEvent::PaymentAssetConfigured(_) => "payment_asset_configured",
            ContractEvent::PaymentAssetRemoved(_) => "payment_asset_removed",
            ContractEvent::DefaultAssetSet(_) => "default_asset_set",
            ContractEvent::Exchanged(_) => "exchanged",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposited_serialization() {
        let event = Deposited {
            vault: Address::from_label("vault"),
            depositor: Address::from_label("alice"),
            asset: Address::from_label("USDC"),
            amount: 2_000_000_000,
        };
        let json = serde_json::to_string(&event).unwrap();
        let deser: Deposited = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deser);
    }

    #[test]
    fn test_contract_event_enum_variant() {
        let event = ContractEvent::Exchanged(Exchanged {
            depositor: Address::from_label("alice"),
            asset: Address::from_label("USDC"),
            amount: 1,
            vault: Address::from_label("vault"),
            settlement_amount: 2,
            destination: Address::from_label("bob"),
        });
        assert!(matches!(event, ContractEvent::Exchanged(_)));
        assert_eq!(event.label(), "exchanged");
    }

    #[test]
    fn test_large_amount_survives_json() {
        let event = ContractEvent::Rebalanced(Rebalanced {
            actor: Address::from_label("admin"),
            requested: u128::MAX,
            moved: u128::MAX - 1,
        });
        let json = serde_json::to_string(&event).unwrap();
        let deser: ContractEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deser);
    }
}
