//! Core blockchain data structures
//!
//! This crate provides the fundamental building blocks shared by the
//! execution layer:
//! - Basic types (Hash, Address, BlockNumber, etc.)
//! - Transaction envelopes and block headers
//! - Event logs and the log bloom filter

pub mod block;
pub mod bloom;
pub mod error;
pub mod transaction;
pub mod types;

// Re-export commonly used types
pub use block::*;
pub use bloom::*;
pub use error::*;
pub use transaction::*;
pub use types::*;
