//! Block headers and event logs

use crate::{Address, BlockNumber, CoreError, CoreResult, Hash, Timestamp};
use serde::{Deserialize, Serialize};

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct BlockHeader {
    /// Hash of the parent block
    pub parent_hash: Hash,
    /// Block number (height)
    pub number: BlockNumber,
    /// Root hash of the state
    pub state_root: Hash,
    /// Root hash of the transactions
    pub transactions_root: Hash,
    /// Root hash of the receipts
    pub receipts_root: Hash,
    /// Block timestamp in milliseconds
    pub timestamp: Timestamp,
    /// Extra data (arbitrary bytes)
    pub extra_data: Vec<u8>,
    /// Gas limit for all transactions in this block
    pub gas_limit: u64,
    /// Gas used by all transactions in this block
    pub gas_used: u64,
}

impl BlockHeader {
    /// Create a header on top of `parent_hash`; roots start out zeroed
    pub fn new(parent_hash: Hash, number: BlockNumber, timestamp: Timestamp, gas_limit: u64) -> Self {
        Self {
            parent_hash,
            number,
            state_root: Hash::zero(),
            transactions_root: Hash::zero(),
            receipts_root: Hash::zero(),
            timestamp,
            extra_data: Vec::new(),
            gas_limit,
            gas_used: 0,
        }
    }

    /// Calculate the hash of this block header
    pub fn hash(&self) -> CoreResult<Hash> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))?;
        Ok(Hash::keccak(&encoded))
    }

    /// Timestamp truncated to whole seconds
    pub fn unix_seconds(&self) -> u64 {
        self.timestamp / 1000
    }

    /// Height-zero header with no parent
    pub fn genesis() -> Self {
        Self {
            extra_data: b"genesis".to_vec(),
            ..Self::new(Hash::zero(), 0, 0, 8_000_000)
        }
    }
}

/// Event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Contract address that emitted the log
    pub address: Address,
    /// Topics (indexed parameters)
    pub topics: Vec<Hash>,
    /// Data (non-indexed parameters)
    pub data: Vec<u8>,
    /// Height of the block the log was recorded in
    pub block_number: BlockNumber,
    /// Identity of the emitting transaction
    pub tx_hash: Hash,
    /// Position of the emitting transaction in its block
    pub tx_index: u32,
    /// Position of the log in its block
    pub index: u32,
}

impl Log {
    /// Create a log that has not been placed in a block yet
    pub fn new(address: Address, topics: Vec<Hash>, data: Vec<u8>) -> Self {
        Self {
            address,
            topics,
            data,
            block_number: 0,
            tx_hash: Hash::zero(),
            tx_index: 0,
            index: 0,
        }
    }

    /// First topic, conventionally the event signature
    pub fn event_signature(&self) -> Option<&Hash> {
        self.topics.first()
    }
}
