//! What [`crate::with_txn`] does with a transaction whose body returned `Ok`.
//!
//! The policy is chosen once per process. Test binaries that must never
//! persist writes install [`TxnPolicy::RollbackOnOk`] from a constructor
//! before any test runs.

use std::fmt;
use std::sync::OnceLock;

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnPolicy {
    /// Commit on success (default)
    CommitOnOk,
    /// Roll back on success; the caller still receives the value
    RollbackOnOk,
}

impl TxnPolicy {
    pub fn commits(self) -> bool {
        matches!(self, TxnPolicy::CommitOnOk)
    }
}

impl fmt::Display for TxnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxnPolicy::CommitOnOk => "commit_on_ok",
            TxnPolicy::RollbackOnOk => "rollback_on_ok",
        })
    }
}

static POLICY: OnceLock<TxnPolicy> = OnceLock::new();

/// The installed policy, `CommitOnOk` until one is installed.
pub fn current() -> TxnPolicy {
    POLICY.get().copied().unwrap_or(TxnPolicy::CommitOnOk)
}

/// Install `policy` for the rest of the process.
///
/// Installing the policy already in force is a no-op. Any other policy is
/// refused and the one in force is returned.
pub fn set_txn_policy(policy: TxnPolicy) -> Result<(), TxnPolicy> {
    if POLICY.set(policy).is_ok() {
        debug!(txn_policy = %policy, "txn_policy=installed");
        return Ok(());
    }

    let installed = current();
    if installed == policy {
        Ok(())
    } else {
        warn!(requested = %policy, installed = %installed, "txn_policy=refused");
        Err(installed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_commit_policy_commits() {
        assert!(TxnPolicy::CommitOnOk.commits());
        assert!(!TxnPolicy::RollbackOnOk.commits());
        assert_eq!(TxnPolicy::RollbackOnOk.to_string(), "rollback_on_ok");
    }
}
