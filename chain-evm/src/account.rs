//! Account model and state

use crate::{LedgerError, LedgerResult};
use chain_core::{Address, Hash, Nonce, Wei};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account nonce (number of transactions sent)
    pub nonce: Nonce,
    /// Account balance
    pub balance: Wei,
    /// Code hash (zero for externally owned accounts)
    pub code_hash: Hash,
}

impl Account {
    /// Create a new empty account
    pub fn new() -> Self {
        Self {
            nonce: 0,
            balance: 0,
            code_hash: Hash::zero(),
        }
    }

    /// Create an account with initial balance
    pub fn with_balance(balance: Wei) -> Self {
        Self {
            balance,
            ..Self::new()
        }
    }

    /// Check if account is empty
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance == 0 && self.code_hash == Hash::zero()
    }

    /// Check if account is a contract
    pub fn is_contract(&self) -> bool {
        self.code_hash != Hash::zero()
    }

    /// Increment nonce
    pub fn increment_nonce(&mut self) {
        self.nonce += 1;
    }

    /// Add to balance
    pub fn add_balance(&mut self, address: Address, amount: Wei) -> LedgerResult<()> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(address))?;
        Ok(())
    }

    /// Subtract from balance
    pub fn sub_balance(&mut self, address: Address, amount: Wei) -> LedgerResult<()> {
        if self.balance < amount {
            return Err(LedgerError::InsufficientBalance {
                address,
                required: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(())
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::new()
    }
}

/// Working copy of an account: header fields plus the storage slots and
/// code written since the last finalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    /// Account information
    pub account: Account,
    /// Written storage slots; a zero value clears the slot
    pub storage: BTreeMap<Hash, Hash>,
    /// Code set since the last finalize
    pub code: Option<Vec<u8>>,
}

impl AccountState {
    /// Create new account state
    pub fn new(account: Account) -> Self {
        Self {
            account,
            storage: BTreeMap::new(),
            code: None,
        }
    }

    /// Get a written storage value
    pub fn get_storage(&self, key: &Hash) -> Option<&Hash> {
        self.storage.get(key)
    }

    /// Record a storage write
    pub fn set_storage(&mut self, key: Hash, value: Hash) {
        self.storage.insert(key, value);
    }

    /// Set contract code
    pub fn set_code(&mut self, code: Vec<u8>) {
        self.account.code_hash = if code.is_empty() {
            Hash::zero()
        } else {
            Hash::keccak(&code)
        };
        self.code = Some(code);
    }
}

/// Account updates made outside the VM (fee deduction, nonce bumps)
#[derive(Debug, Clone, Default)]
pub struct AccountChanges {
    /// Updated accounts
    pub accounts: BTreeMap<Address, Account>,
}

impl AccountChanges {
    /// Create new empty changes
    pub fn new() -> Self {
        Self::default()
    }

    /// Update account
    pub fn update_account(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    /// Check if changes are empty
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Merge with another changes set; later updates win
    pub fn merge(&mut self, other: AccountChanges) {
        self.accounts.extend(other.accounts);
    }
}
