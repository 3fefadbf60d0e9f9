//! 2048-bit log bloom filter

use crate::{Hash, Log};
use std::fmt;
use std::ops::BitOrAssign;

/// Bloom width in bytes
pub const BLOOM_SIZE: usize = 256;

/// Probabilistic summary of the addresses and topics of a set of logs.
///
/// Every input sets three bits chosen from its Keccak-256 digest, so the
/// bloom of a log sequence is the bitwise OR of the blooms of its logs.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bloom([u8; BLOOM_SIZE]);

impl Bloom {
    /// Empty bloom
    pub fn zero() -> Self {
        Self([0u8; BLOOM_SIZE])
    }

    /// Create from raw bytes
    pub fn new(bytes: [u8; BLOOM_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the underlying byte array
    pub fn as_bytes(&self) -> &[u8; BLOOM_SIZE] {
        &self.0
    }

    /// Whether no bit is set
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Set the three bits selected by `input`
    pub fn accrue(&mut self, input: &[u8]) {
        for (byte, mask) in bit_positions(&Hash::keccak(input)) {
            self.0[byte] |= mask;
        }
    }

    /// Accrue a log's address and every topic
    pub fn accrue_log(&mut self, log: &Log) {
        self.accrue(log.address.as_ref());
        for topic in &log.topics {
            self.accrue(topic.as_ref());
        }
    }

    /// Whether every bit selected by `input` is set
    pub fn contains_input(&self, input: &[u8]) -> bool {
        bit_positions(&Hash::keccak(input))
            .iter()
            .all(|(byte, mask)| self.0[*byte] & mask == *mask)
    }

    /// Whether every bit set in `other` is also set here
    pub fn contains_bloom(&self, other: &Bloom) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a & b == *b)
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

fn bit_positions(digest: &Hash) -> [(usize, u8); 3] {
    let d = digest.as_bytes();
    let mut out = [(0usize, 0u8); 3];
    for (slot, i) in out.iter_mut().zip([0usize, 2, 4]) {
        let bit = ((usize::from(d[i]) << 8) | usize::from(d[i + 1])) & 2047;
        *slot = (BLOOM_SIZE - 1 - bit / 8, 1u8 << (bit % 8));
    }
    out
}

impl Default for Bloom {
    fn default() -> Self {
        Self::zero()
    }
}

impl BitOrAssign for Bloom {
    fn bitor_assign(&mut self, rhs: Self) {
        for (a, b) in self.0.iter_mut().zip(rhs.0.iter()) {
            *a |= b;
        }
    }
}

impl fmt::Debug for Bloom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bloom(0x{})", self.to_hex())
    }
}

impl From<&Log> for Bloom {
    fn from(log: &Log) -> Self {
        let mut bloom = Bloom::zero();
        bloom.accrue_log(log);
        bloom
    }
}

/// Bloom of an ordered log sequence
pub fn logs_bloom<'a>(logs: impl IntoIterator<Item = &'a Log>) -> Bloom {
    logs.into_iter().fold(Bloom::zero(), |mut bloom, log| {
        bloom.accrue_log(log);
        bloom
    })
}
