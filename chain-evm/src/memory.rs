//! In-memory ledger view

use crate::account::{Account, AccountChanges, AccountState};
use crate::config::Params;
use crate::state::LedgerView;
use crate::{LedgerError, LedgerResult};
use chain_core::{Address, BlockNumber, Hash, Log, Nonce, Wei};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Number of past block hashes kept by default
pub const DEFAULT_HASH_RETENTION: u64 = 256;

/// Uncommitted changes of the current transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct WorkingSet {
    objects: BTreeMap<Address, AccountState>,
    logs: BTreeMap<Hash, Vec<Log>>,
    log_count: u32,
}

/// Ledger kept entirely in memory.
///
/// Holds a committed world state plus a working set. Account updates made
/// outside the VM go straight to the committed state and reach the working
/// set only through [`LedgerView::update_pending_accounts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLedger {
    params: Params,
    /// Committed accounts
    accounts: BTreeMap<Address, Account>,
    /// Committed storage
    storage: BTreeMap<Address, BTreeMap<Hash, Hash>>,
    /// Contract code by code hash
    code: BTreeMap<Hash, Vec<u8>>,
    /// Committed logs by transaction hash
    tx_logs: BTreeMap<Hash, Vec<Log>>,
    /// Retained block hashes
    height_hashes: BTreeMap<BlockNumber, Hash>,
    hash_retention: u64,
    current_height: BlockNumber,
    block_log_count: u32,
    state_root: Hash,
    working: WorkingSet,
    snapshots: Vec<WorkingSet>,
    pending: BTreeSet<Address>,
    tx_hash: Hash,
    tx_index: u32,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new(params: Params) -> Self {
        let mut ledger = Self {
            params,
            accounts: BTreeMap::new(),
            storage: BTreeMap::new(),
            code: BTreeMap::new(),
            tx_logs: BTreeMap::new(),
            height_hashes: BTreeMap::new(),
            hash_retention: DEFAULT_HASH_RETENTION,
            current_height: 0,
            block_log_count: 0,
            state_root: Hash::zero(),
            working: WorkingSet::default(),
            snapshots: Vec::new(),
            pending: BTreeSet::new(),
            tx_hash: Hash::zero(),
            tx_index: 0,
        };
        ledger.update_state_root();
        ledger
    }

    /// Keep only the last `heights` block hashes
    pub fn with_hash_retention(mut self, heights: u64) -> Self {
        self.hash_retention = heights.max(1);
        self
    }

    /// Replace module parameters
    pub fn set_params(&mut self, params: Params) -> LedgerResult<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Apply account updates made outside the VM
    pub fn apply_external(&mut self, changes: AccountChanges) {
        for (address, account) in changes.accounts {
            self.accounts.insert(address, account);
            self.pending.insert(address);
        }
        self.update_state_root();
    }

    /// Committed account, ignoring the working set
    pub fn committed_account(&self, address: &Address) -> Option<Account> {
        self.accounts.get(address).cloned()
    }

    /// Start executing block `height`
    pub fn begin_block(&mut self, height: BlockNumber) {
        self.current_height = height;
        self.block_log_count = 0;
    }

    /// Store the hash of a finished block and prune old ones
    pub fn commit_block(&mut self, height: BlockNumber, hash: Hash) {
        self.height_hashes.insert(height, hash);
        if let Some(oldest_dropped) = height.checked_sub(self.hash_retention) {
            self.height_hashes = self.height_hashes.split_off(&(oldest_dropped + 1));
        }
    }

    /// Height of the block being executed
    pub fn current_height(&self) -> BlockNumber {
        self.current_height
    }

    /// Committed logs recorded in blocks `from..=to`, in block order
    pub fn filter_logs(&self, from: BlockNumber, to: BlockNumber) -> Vec<Log> {
        let mut logs: Vec<Log> = self
            .tx_logs
            .values()
            .flatten()
            .filter(|log| log.block_number >= from && log.block_number <= to)
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.index));
        logs
    }

    /// State root of the committed world state
    pub fn state_root(&self) -> Hash {
        self.state_root
    }

    /// Number of open snapshots
    pub fn snapshot_depth(&self) -> usize {
        self.snapshots.len()
    }

    fn update_state_root(&mut self) {
        let mut hasher = blake3::Hasher::new();

        for (address, account) in &self.accounts {
            hasher.update(address.as_bytes());
            hasher.update(&account.nonce.to_le_bytes());
            hasher.update(&account.balance.to_le_bytes());
            hasher.update(account.code_hash.as_bytes());
            if let Some(slots) = self.storage.get(address) {
                for (key, value) in slots {
                    hasher.update(key.as_bytes());
                    hasher.update(value.as_bytes());
                }
            }
        }

        self.state_root = Hash::new(*hasher.finalize().as_bytes());
    }

    fn account(&self, address: &Address) -> Option<Account> {
        match self.working.objects.get(address) {
            Some(state) => Some(state.account.clone()),
            None => self.accounts.get(address).cloned(),
        }
    }

    fn object_mut(&mut self, address: Address) -> &mut AccountState {
        let committed = &self.accounts;
        self.working
            .objects
            .entry(address)
            .or_insert_with(|| AccountState::new(committed.get(&address).cloned().unwrap_or_default()))
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl LedgerView for MemoryLedger {
    fn copy(&self) -> Self {
        self.clone()
    }

    fn nonce(&self, address: &Address) -> Nonce {
        self.account(address).map_or(0, |account| account.nonce)
    }

    fn set_nonce(&mut self, address: Address, nonce: Nonce) {
        self.object_mut(address).account.nonce = nonce;
    }

    fn balance(&self, address: &Address) -> Wei {
        self.account(address).map_or(0, |account| account.balance)
    }

    fn add_balance(&mut self, address: Address, amount: Wei) -> LedgerResult<()> {
        self.object_mut(address).account.add_balance(address, amount)
    }

    fn sub_balance(&mut self, address: Address, amount: Wei) -> LedgerResult<()> {
        self.object_mut(address).account.sub_balance(address, amount)
    }

    fn code(&self, address: &Address) -> Option<Vec<u8>> {
        if let Some(code) = self
            .working
            .objects
            .get(address)
            .and_then(|state| state.code.clone())
        {
            return Some(code);
        }
        let account = self.account(address)?;
        if !account.is_contract() {
            return None;
        }
        self.code.get(&account.code_hash).cloned()
    }

    fn set_code(&mut self, address: Address, code: Vec<u8>) {
        self.object_mut(address).set_code(code);
    }

    fn storage(&self, address: &Address, key: &Hash) -> Hash {
        if let Some(value) = self
            .working
            .objects
            .get(address)
            .and_then(|state| state.get_storage(key))
        {
            return *value;
        }
        self.storage
            .get(address)
            .and_then(|slots| slots.get(key))
            .copied()
            .unwrap_or_default()
    }

    fn set_storage(&mut self, address: Address, key: Hash, value: Hash) {
        self.object_mut(address).set_storage(key, value);
    }

    fn exists(&self, address: &Address) -> bool {
        self.working.objects.contains_key(address) || self.accounts.contains_key(address)
    }

    fn snapshot(&mut self) -> usize {
        self.snapshots.push(self.working.clone());
        self.snapshots.len() - 1
    }

    fn revert_to_snapshot(&mut self, id: usize) -> LedgerResult<()> {
        if id >= self.snapshots.len() {
            return Err(LedgerError::InvalidSnapshot(id));
        }
        let mut reverted = self.snapshots.split_off(id);
        self.working = reverted.swap_remove(0);
        Ok(())
    }

    fn prepare(&mut self, tx_hash: Hash, tx_index: u32) {
        self.tx_hash = tx_hash;
        self.tx_index = tx_index;
    }

    fn add_log(&mut self, mut log: Log) {
        log.block_number = self.current_height;
        log.tx_hash = self.tx_hash;
        log.tx_index = self.tx_index;
        log.index = self.block_log_count + self.working.log_count;
        self.working.log_count += 1;
        self.working.logs.entry(self.tx_hash).or_default().push(log);
    }

    fn params(&self) -> LedgerResult<Params> {
        Ok(self.params.clone())
    }

    fn update_pending_accounts(&mut self) -> LedgerResult<()> {
        for address in std::mem::take(&mut self.pending) {
            let committed = self.accounts.get(&address).cloned().unwrap_or_default();
            if let Some(state) = self.working.objects.get_mut(&address) {
                state.account.nonce = committed.nonce;
                state.account.balance = committed.balance;
            }
        }
        Ok(())
    }

    fn logs(&self, tx_hash: &Hash) -> LedgerResult<Vec<Log>> {
        let committed = self.tx_logs.get(tx_hash).into_iter().flatten();
        let working = self.working.logs.get(tx_hash).into_iter().flatten();
        Ok(committed.chain(working).cloned().collect())
    }

    fn height_hash(&self, height: BlockNumber) -> Option<Hash> {
        self.height_hashes.get(&height).copied()
    }

    fn finalize(&mut self, delete_empty: bool) -> LedgerResult<()> {
        let working = std::mem::take(&mut self.working);
        self.snapshots.clear();
        let touched = working.objects.len();

        for (address, state) in working.objects {
            if delete_empty && state.account.is_empty() {
                self.accounts.remove(&address);
                self.storage.remove(&address);
                continue;
            }

            if let Some(code) = state.code {
                if state.account.is_contract() {
                    self.code.insert(state.account.code_hash, code);
                }
            }

            let slots = self.storage.entry(address).or_default();
            for (key, value) in state.storage {
                if value.is_zero() {
                    slots.remove(&key);
                } else {
                    slots.insert(key, value);
                }
            }
            if slots.is_empty() {
                self.storage.remove(&address);
            }

            self.accounts.insert(address, state.account);
        }

        for (tx_hash, logs) in working.logs {
            self.tx_logs.entry(tx_hash).or_default().extend(logs);
        }
        self.block_log_count += working.log_count;

        self.update_state_root();
        debug!(touched, state_root = %self.state_root, "ledger finalized");
        Ok(())
    }
}
