//! Identifiers for accounts, contracts and assets
//!
//! Every participant (depositor, vault, router, token) is addressed by a
//! 20-byte `Address`. The all-zero address is the null identifier and is
//! never a valid owner or asset.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of an address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// A 20-byte identifier.
///
/// Displays and serializes as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// The null identifier.
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    /// Sentinel identifying the native settlement asset.
    pub const NATIVE: Address = Address([0xee; ADDRESS_LEN]);

    /// Create a fresh, unique address.
    ///
    /// The trailing 16 bytes are a UUID v7, so addresses created later sort
    /// after addresses created earlier.
    pub fn new() -> Self {
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes[4..].copy_from_slice(Uuid::now_v7().as_bytes());
        bytes[0] = 0x01;
        Self(bytes)
    }

    /// Derive an address deterministically from arbitrary seed bytes.
    ///
    /// The address is the last 20 bytes of `SHA-256(seed)`.
    pub fn derive(seed: &[u8]) -> Self {
        let digest: [u8; 32] = Sha256::digest(seed).into();
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[32 - ADDRESS_LEN..]);
        Self(bytes)
    }

    /// Derive an address from a human-readable label. Handy for fixtures.
    pub fn from_label(label: &str) -> Self {
        Self::derive(label.as_bytes())
    }

    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Whether this is the null identifier.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    /// Whether this is the native settlement asset sentinel.
    pub fn is_native(&self) -> bool {
        *self == Self::NATIVE
    }

    /// Short form used in log fields: first four bytes in hex.
    pub fn short(&self) -> String {
        format!("0x{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

/// Error parsing an address from its hex form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid address: {0}")]
pub struct ParseAddressError(pub String);

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(digits).map_err(|_| ParseAddressError(s.to_string()))?;
        let bytes: [u8; ADDRESS_LEN] = raw
            .try_into()
            .map_err(|_| ParseAddressError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
