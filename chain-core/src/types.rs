//! Fixed-size primitives shared by the execution layer

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Block height
pub type BlockNumber = u64;

/// Milliseconds since the Unix epoch
pub type Timestamp = u64;

/// Gas units
pub type Gas = u64;

/// Amount in the smallest currency unit
pub type Wei = u128;

/// Account nonce
pub type Nonce = u64;

macro_rules! fixed_bytes {
    ($(#[$doc:meta])* $name:ident, $len:expr, $kind:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            bincode::Encode,
        )]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Copy from a slice whose length is already checked
            pub(crate) fn from_slice(slice: &[u8]) -> Self {
                let mut bytes = [0u8; $len];
                bytes.copy_from_slice(slice);
                Self(bytes)
            }

            pub fn try_from_slice(slice: &[u8]) -> CoreResult<Self> {
                if slice.len() != $len {
                    return Err(CoreError::InvalidLength {
                        kind: $kind,
                        expected: $len,
                        actual: slice.len(),
                    });
                }
                Ok(Self::from_slice(slice))
            }

            /// Parse hex, with or without a `0x` prefix
            pub fn from_hex(hex: &str) -> CoreResult<Self> {
                let digits = hex.strip_prefix("0x").unwrap_or(hex);
                Self::try_from_slice(&hex::decode(digits)?)
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::zero()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", self.to_hex())
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

fixed_bytes!(
    /// 32-byte word: hashes, storage keys and storage values
    Hash,
    32,
    "hash"
);

fixed_bytes!(
    /// 20-byte account address
    Address,
    20,
    "address"
);

impl Hash {
    /// Keccak-256 digest of `data`
    pub fn keccak(data: &[u8]) -> Self {
        Self::from_slice(Keccak256::digest(data).as_slice())
    }

    /// Storage word holding `value` big-endian in its low 8 bytes
    pub fn from_low_u64_be(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}

impl Address {
    /// Last 20 bytes of `hash`
    pub fn from_hash(hash: &Hash) -> Self {
        Self::from_slice(&hash.as_bytes()[12..])
    }
}
