//! Ledger view capability and shared handles

use crate::config::Params;
use crate::LedgerResult;
use chain_core::{Address, BlockNumber, Hash, Log, Nonce, Wei};
use parking_lot::RwLock;
use std::sync::Arc;

/// Versioned account/storage store a transition runs against.
///
/// Writes land in a working set that nested snapshots can roll back;
/// nothing becomes part of the addressable world state until
/// [`LedgerView::finalize`] is called.
pub trait LedgerView {
    /// Independent copy; nothing done to the copy is visible here
    fn copy(&self) -> Self
    where
        Self: Sized;

    /// Get account nonce
    fn nonce(&self, address: &Address) -> Nonce;

    /// Set account nonce
    fn set_nonce(&mut self, address: Address, nonce: Nonce);

    /// Get account balance
    fn balance(&self, address: &Address) -> Wei;

    /// Add to account balance
    fn add_balance(&mut self, address: Address, amount: Wei) -> LedgerResult<()>;

    /// Subtract from account balance
    fn sub_balance(&mut self, address: Address, amount: Wei) -> LedgerResult<()>;

    /// Get contract code
    fn code(&self, address: &Address) -> Option<Vec<u8>>;

    /// Set contract code
    fn set_code(&mut self, address: Address, code: Vec<u8>);

    /// Get storage slot; unset slots read as zero
    fn storage(&self, address: &Address, key: &Hash) -> Hash;

    /// Set storage slot
    fn set_storage(&mut self, address: Address, key: Hash, value: Hash);

    /// Whether the account exists
    fn exists(&self, address: &Address) -> bool;

    /// Open a nested snapshot of the working set
    fn snapshot(&mut self) -> usize;

    /// Roll the working set back to snapshot `id`, discarding later ones
    fn revert_to_snapshot(&mut self, id: usize) -> LedgerResult<()>;

    /// Set the transaction identity new logs are recorded under
    fn prepare(&mut self, tx_hash: Hash, tx_index: u32);

    /// Record a log for the prepared transaction
    fn add_log(&mut self, log: Log);

    /// Module parameters
    fn params(&self) -> LedgerResult<Params>;

    /// Fold account changes made outside the VM into the working set
    fn update_pending_accounts(&mut self) -> LedgerResult<()>;

    /// Logs recorded for a transaction, in emission order
    fn logs(&self, tx_hash: &Hash) -> LedgerResult<Vec<Log>>;

    /// Stored hash of a past block, if still retained
    fn height_hash(&self, height: BlockNumber) -> Option<Hash>;

    /// Commit the working set into the world state
    fn finalize(&mut self, delete_empty: bool) -> LedgerResult<()>;
}

/// Thread-safe ledger handle.
///
/// Committing work goes through [`SharedLedger::write`], which serializes
/// writers on the live view. Estimations take [`SharedLedger::fork`], which
/// holds the read lock only while copying, so they run in parallel.
pub struct SharedLedger<L> {
    inner: Arc<RwLock<L>>,
}

impl<L: LedgerView> SharedLedger<L> {
    /// Create new shared ledger
    pub fn new(ledger: L) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ledger)),
        }
    }

    /// Run `f` against the live view (read-only)
    pub fn read<R>(&self, f: impl FnOnce(&L) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run `f` against the live view with exclusive access
    pub fn write<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Independent copy of the live view
    pub fn fork(&self) -> L {
        self.inner.read().copy()
    }
}

impl<L> Clone for SharedLedger<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
