//! Scoped sender nonce overrides

use crate::state::LedgerView;
use crate::{TransitionError, TransitionResult};
use chain_core::{Address, Nonce};
use std::ops::{Deref, DerefMut};

/// Overwrites an account nonce for the lifetime of the guard.
///
/// The nonce observed at construction is written back on drop, whichever
/// way the guarded scope is left.
pub struct NonceGuard<'a, L: LedgerView + ?Sized> {
    ledger: &'a mut L,
    address: Address,
    original: Nonce,
}

impl<'a, L: LedgerView + ?Sized> NonceGuard<'a, L> {
    /// Set `address`'s nonce to `nonce` until the guard is dropped
    pub fn set(ledger: &'a mut L, address: Address, nonce: Nonce) -> Self {
        let original = ledger.nonce(&address);
        ledger.set_nonce(address, nonce);
        Self {
            ledger,
            address,
            original,
        }
    }

    /// Nonce that will be restored
    pub fn original(&self) -> Nonce {
        self.original
    }

    /// Bump the guarded nonce by one; the nonce is left as is on overflow
    pub fn increment(&mut self) -> TransitionResult<()> {
        let next = self
            .ledger
            .nonce(&self.address)
            .checked_add(1)
            .ok_or(TransitionError::NonceOverflow(self.address))?;
        self.ledger.set_nonce(self.address, next);
        Ok(())
    }
}

impl<L: LedgerView + ?Sized> Deref for NonceGuard<'_, L> {
    type Target = L;

    fn deref(&self) -> &L {
        self.ledger
    }
}

impl<L: LedgerView + ?Sized> DerefMut for NonceGuard<'_, L> {
    fn deref_mut(&mut self) -> &mut L {
        self.ledger
    }
}

impl<L: LedgerView + ?Sized> Drop for NonceGuard<'_, L> {
    fn drop(&mut self) {
        self.ledger.set_nonce(self.address, self.original);
    }
}
