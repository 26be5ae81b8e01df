//! Transaction-scoped context propagation.
//!
//! Data-access code resolves "the database to use right now" from a
//! [`TxContext`] instead of having a transaction threaded through every call.
//! The business-transaction boundary ([`with_txn`]) installs the transaction;
//! repositories hold a [`DbResolver`] built with [`resolve`] or [`fixed`].

pub mod ambient;
pub mod context;
pub mod handle;
pub mod resolver;
pub mod txn;
pub mod txn_policy;

pub use context::{TxContext, ERR_NO_TRANSACTION};
pub use handle::{DbHandle, SharedTxn, ERR_TXN_STILL_SHARED};
pub use resolver::{fixed, resolve, DbResolver};
pub use txn::with_txn;
pub use txn_policy::TxnPolicy;
