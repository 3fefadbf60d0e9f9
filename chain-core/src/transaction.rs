//! Transaction data structures and operations

use crate::{Address, CoreError, CoreResult, Gas, Hash, Nonce, Wei};
use serde::{Deserialize, Serialize};

/// Transaction data structure.
///
/// Signatures are checked before a transaction reaches execution, so the
/// envelope here only carries what execution needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct Transaction {
    /// Transaction nonce (number of transactions sent from this address)
    pub nonce: Nonce,
    /// Gas price in wei
    pub gas_price: Wei,
    /// Maximum gas to use for this transaction
    pub gas_limit: Gas,
    /// Recipient address (None for contract creation)
    pub to: Option<Address>,
    /// Value to transfer in wei
    pub value: Wei,
    /// Transaction data/input
    pub data: Vec<u8>,
}

impl Transaction {
    /// Create a new transaction
    pub fn new(
        nonce: Nonce,
        gas_price: Wei,
        gas_limit: Gas,
        to: Option<Address>,
        value: Wei,
        data: Vec<u8>,
    ) -> Self {
        Self {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data,
        }
    }

    /// Create a message call transaction
    pub fn call(
        nonce: Nonce,
        to: Address,
        value: Wei,
        gas_price: Wei,
        gas_limit: Gas,
        data: Vec<u8>,
    ) -> Self {
        Self::new(nonce, gas_price, gas_limit, Some(to), value, data)
    }

    /// Create a contract creation transaction
    pub fn create_contract(
        nonce: Nonce,
        value: Wei,
        gas_price: Wei,
        gas_limit: Gas,
        code: Vec<u8>,
    ) -> Self {
        Self::new(nonce, gas_price, gas_limit, None, value, code)
    }

    /// Whether this transaction deploys a contract
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    /// Calculate transaction hash
    pub fn hash(&self) -> CoreResult<Hash> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))?;
        Ok(Hash::keccak(&encoded))
    }

    /// Upper bound on the fee this transaction can be charged
    pub fn max_fee(&self) -> CoreResult<Wei> {
        Wei::from(self.gas_limit)
            .checked_mul(self.gas_price)
            .ok_or_else(|| CoreError::Overflow("gas_limit * gas_price".to_string()))
    }
}
