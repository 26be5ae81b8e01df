use std::future::Future;

use sea_orm::{DatabaseConnection, DbErr};
use tracing::{debug, warn};

use crate::context::TxContext;
use crate::handle::SharedTxn;
use crate::txn_policy;

/// Execute `f` within a business transaction.
///
/// 1) If `ctx` already carries a transaction, `f` joins it; this boundary
///    neither commits nor rolls back (the owner that installed it does).
/// 2) Otherwise a transaction is begun on `db`, `f` receives a derived
///    context carrying it, and the policy is applied on `Ok` / rollback on `Err`.
///
/// `f` must not let its context outlive the returned future, otherwise the
/// transaction cannot be finished and the call fails with
/// [`crate::ERR_TXN_STILL_SHARED`].
pub async fn with_txn<R, E, F, Fut>(ctx: &TxContext, db: &DatabaseConnection, f: F) -> Result<R, E>
where
    F: FnOnce(TxContext) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: From<DbErr>,
{
    if ctx.has_transaction() {
        debug!("txn=join");
        return f(ctx.clone()).await;
    }

    let shared = SharedTxn::open(db).await?;
    debug!("txn=begin");
    let out = f(ctx.with_transaction(shared.clone())).await;

    match out {
        Ok(val) => {
            let policy = txn_policy::current();
            if policy.commits() {
                shared.commit().await?;
            } else {
                shared.rollback().await?;
            }
            debug!(policy = %policy, "txn=finish");
            Ok(val)
        }
        Err(err) => {
            // Best-effort rollback; preserve original error
            if let Err(rollback_err) = shared.rollback().await {
                warn!(error = %rollback_err, "txn=rollback_failed");
            }
            Err(err)
        }
    }
}
