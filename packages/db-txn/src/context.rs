//! Ambient transaction state.
//!
//! A [`TxContext`] is an immutable value: every setter returns a derived
//! context and leaves its input untouched, so an inner scope can never
//! retroactively change what an outer scope resolves.

use std::fmt;

use tracing::error;

use crate::handle::{DbHandle, SharedTxn};

/// Panic message of [`TxContext::must_transaction`].
pub const ERR_NO_TRANSACTION: &str =
    "transaction not found in context - ensure with_transaction was called";

#[derive(Clone, Default)]
pub struct TxContext {
    txn: Option<SharedTxn>,
    row_locking: Option<bool>,
}

impl TxContext {
    /// An empty context: no transaction, no row locking.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a context carrying `txn` as the ambient transaction.
    pub fn with_transaction(&self, txn: SharedTxn) -> Self {
        Self {
            txn: Some(txn),
            row_locking: self.row_locking,
        }
    }

    /// The ambient transaction, if any.
    ///
    /// When row locking is requested on this context the returned handle
    /// applies `FOR UPDATE` to selects passed through [`DbHandle::lock`].
    pub fn transaction(&self) -> Option<DbHandle> {
        self.txn
            .as_ref()
            .map(|txn| DbHandle::transaction(txn.clone()).with_row_locking(self.is_row_locking()))
    }

    /// Like [`TxContext::transaction`], but a missing transaction is a
    /// programmer error and aborts immediately.
    pub fn must_transaction(&self) -> DbHandle {
        match self.transaction() {
            Some(handle) => handle,
            None => {
                error!("txn_ctx=missing caller=must_transaction");
                panic!("{ERR_NO_TRANSACTION}");
            }
        }
    }

    /// Derive a context whose resolved transaction locks selected rows.
    pub fn with_row_locking(&self) -> Self {
        Self {
            txn: self.txn.clone(),
            row_locking: Some(true),
        }
    }

    pub fn is_row_locking(&self) -> bool {
        self.row_locking.unwrap_or(false)
    }

    pub fn has_transaction(&self) -> bool {
        self.txn.is_some()
    }
}

impl fmt::Debug for TxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxContext")
            .field("has_transaction", &self.has_transaction())
            .field("row_locking", &self.is_row_locking())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_has_no_transaction() {
        let ctx = TxContext::new();
        assert!(ctx.transaction().is_none());
        assert!(!ctx.has_transaction());
        assert!(!ctx.is_row_locking());
    }

    #[test]
    fn row_locking_derivation_leaves_input_untouched() {
        let base = TxContext::new();
        let locking = base.with_row_locking();

        assert!(locking.is_row_locking());
        assert!(!base.is_row_locking());
    }

    #[test]
    #[should_panic(expected = "transaction not found in context")]
    fn must_transaction_panics_without_transaction() {
        let _ = TxContext::new().must_transaction();
    }
}
