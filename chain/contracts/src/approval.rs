//! Signed approvals: allowance granted by an off-band Ed25519 signature
//!
//! The owner signs a SHA-256 digest over the approval fields and the
//! verifier's domain; a relayer submits it and the verifier sets the token
//! allowance. Nonces are sequential per owner so each signature is usable
//! exactly once. Deadlines are enforced by the caller before verification.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;
use types::ids::Address;
use types::numeric::Amount;

use crate::errors::ApprovalError;
use crate::host::Host;
use crate::security::NonceTracker;

/// Domain tag mixed into every approval digest.
const PERMIT_DOMAIN_TAG: &[u8] = b"settlement-permit:v1";

/// A signed approval as submitted by a relayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permit {
    pub owner: Address,
    pub spender: Address,
    pub amount: Amount,
    /// Unix seconds after which the approval is void
    pub deadline: u64,
    /// Ed25519 signature as hex string
    pub signature: String,
}

/// Verifies a signed approval and applies the allowance it grants.
pub trait ApprovalVerifier: fmt::Debug {
    fn consume_approval(&mut self, token: Address, permit: &Permit, host: &mut Host) -> Result<(), ApprovalError>;
}

/// Registry of owner keys and nonces backing [`Permit`] verification.
#[derive(Debug, Clone)]
pub struct PermitBook {
    domain: Address,
    keys: BTreeMap<Address, VerifyingKey>,
    nonces: NonceTracker,
}

impl PermitBook {
    pub fn new(domain: Address) -> Self {
        Self {
            domain,
            keys: BTreeMap::new(),
            nonces: NonceTracker::new(),
        }
    }

    pub fn domain(&self) -> Address {
        self.domain
    }

    /// Register a signer. Returns the address owned by that key.
    pub fn register_key(&mut self, key: VerifyingKey) -> Address {
        let owner = owner_of(&key);
        self.keys.insert(owner, key);
        owner
    }

    pub fn is_registered(&self, owner: Address) -> bool {
        self.keys.contains_key(&owner)
    }

    /// Nonce the owner's next approval must be signed over.
    pub fn nonce(&self, owner: Address) -> u64 {
        self.nonces.current(owner)
    }

    /// SHA-256 digest an owner signs.
    pub fn digest(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: Amount,
        nonce: u64,
        deadline: u64,
    ) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(PERMIT_DOMAIN_TAG);
        hasher.update(self.domain.as_bytes());
        hasher.update(token.as_bytes());
        hasher.update(owner.as_bytes());
        hasher.update(spender.as_bytes());
        hasher.update(amount.to_be_bytes());
        hasher.update(nonce.to_be_bytes());
        hasher.update(deadline.to_be_bytes());
        hasher.finalize().into()
    }

    /// Produce a permit over the owner's current nonce. Client-side helper.
    pub fn sign(
        &self,
        key: &SigningKey,
        token: Address,
        spender: Address,
        amount: Amount,
        deadline: u64,
    ) -> Permit {
        let owner = owner_of(&key.verifying_key());
        let digest = self.digest(token, owner, spender, amount, self.nonce(owner), deadline);
        let signature = key.sign(&digest);
        Permit {
            owner,
            spender,
            amount,
            deadline,
            signature: hex::encode(signature.to_bytes()),
        }
    }
}

impl ApprovalVerifier for PermitBook {
    fn consume_approval(&mut self, token: Address, permit: &Permit, host: &mut Host) -> Result<(), ApprovalError> {
        let key = self
            .keys
            .get(&permit.owner)
            .ok_or(ApprovalError::UnknownSigner { owner: permit.owner })?;

        let sig_bytes: [u8; 64] = hex::decode(&permit.signature)
            .map_err(|_| ApprovalError::InvalidSignature)?
            .try_into()
            .map_err(|_| ApprovalError::InvalidSignature)?;
        let signature = Signature::from_bytes(&sig_bytes);

        let nonce = self.nonces.current(permit.owner);
        let digest = self.digest(token, permit.owner, permit.spender, permit.amount, nonce, permit.deadline);
        key.verify(&digest, &signature)
            .map_err(|_| ApprovalError::InvalidSignature)?;

        host.approve(token, permit.owner, permit.spender, permit.amount)?;
        self.nonces.consume(permit.owner);
        info!(owner = %permit.owner.short(), spender = %permit.spender.short(), amount = permit.amount, nonce, "Signed approval consumed");
        Ok(())
    }
}

/// Address controlled by an Ed25519 key.
pub fn owner_of(key: &VerifyingKey) -> Address {
    Address::derive(&key.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (PermitBook, Host, SigningKey, Address, Address) {
        let mut host = Host::new(1, 1_000);
        let token = host.deploy_token("USDC", 6);
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let mut book = PermitBook::new(Address::from_label("router"));
        let owner = book.register_key(key.verifying_key());
        (book, host, key, token, owner)
    }

    #[test]
    fn test_permit_sets_allowance_and_advances_nonce() {
        let (mut book, mut host, key, token, owner) = setup();
        let spender = Address::from_label("router");
        let permit = book.sign(&key, token, spender, 500, 2_000);
        book.consume_approval(token, &permit, &mut host).unwrap();
        assert_eq!(host.allowance(token, owner, spender), 500);
        assert_eq!(book.nonce(owner), 1);
    }

    #[test]
    fn test_permit_replay_rejected() {
        let (mut book, mut host, key, token, _) = setup();
        let permit = book.sign(&key, token, Address::from_label("router"), 500, 2_000);
        book.consume_approval(token, &permit, &mut host).unwrap();
        assert_eq!(
            book.consume_approval(token, &permit, &mut host),
            Err(ApprovalError::InvalidSignature)
        );
    }

    #[test]
    fn test_permit_tampered_amount_rejected() {
        let (mut book, mut host, key, token, owner) = setup();
        let mut permit = book.sign(&key, token, Address::from_label("router"), 500, 2_000);
        permit.amount = 5_000;
        assert_eq!(
            book.consume_approval(token, &permit, &mut host),
            Err(ApprovalError::InvalidSignature)
        );
        assert_eq!(book.nonce(owner), 0, "Failed permits do not burn the nonce");
    }

    #[test]
    fn test_permit_other_token_rejected() {
        let (mut book, mut host, key, token, _) = setup();
        let other = host.deploy_token("DAI", 18);
        let permit = book.sign(&key, token, Address::from_label("router"), 500, 2_000);
        assert_eq!(
            book.consume_approval(other, &permit, &mut host),
            Err(ApprovalError::InvalidSignature)
        );
    }

    #[test]
    fn test_permit_unknown_signer() {
        let (mut book, mut host, _, token, _) = setup();
        let stranger = SigningKey::from_bytes(&[9u8; 32]);
        let permit = book.sign(&stranger, token, Address::from_label("router"), 1, 2_000);
        assert_eq!(
            book.consume_approval(token, &permit, &mut host),
            Err(ApprovalError::UnknownSigner { owner: permit.owner })
        );
    }

    #[test]
    fn test_permit_malformed_signature() {
        let (mut book, mut host, key, token, _) = setup();
        let mut permit = book.sign(&key, token, Address::from_label("router"), 1, 2_000);
        permit.signature = "zz".to_string();
        assert_eq!(
            book.consume_approval(token, &permit, &mut host),
            Err(ApprovalError::InvalidSignature)
        );
    }

    #[test]
    fn test_owner_derived_from_key() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let mut book = PermitBook::new(Address::from_label("router"));
        assert_eq!(book.register_key(key.verifying_key()), owner_of(&key.verifying_key()));
        assert!(book.is_registered(owner_of(&key.verifying_key())));
    }
}
