use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, ExecResult,
    QueryResult, QuerySelect, Statement, TransactionTrait,
};
use tokio::time::Instant;

/// Error message returned when a commit/rollback is attempted while other
/// clones of the transaction are still alive.
pub const ERR_TXN_STILL_SHARED: &str = "Cannot finish transaction: transaction is still shared";

/// A transaction that can be handed to several holders (contexts, handles,
/// cleanup actions). Finishing it requires the last reference.
#[derive(Clone)]
pub struct SharedTxn(pub Arc<DatabaseTransaction>);

impl SharedTxn {
    /// Begin a transaction on `db` and wrap it.
    pub async fn open(db: &DatabaseConnection) -> Result<Self, DbErr> {
        let txn = db.begin().await?;
        Ok(Self(Arc::new(txn)))
    }

    /// Get a reference to the underlying database transaction
    pub fn transaction(&self) -> &DatabaseTransaction {
        &self.0
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// True when both values point at the same transaction.
    pub fn ptr_eq(&self, other: &SharedTxn) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub async fn commit(self) -> Result<(), DbErr> {
        self.into_inner()?.commit().await
    }

    pub async fn rollback(self) -> Result<(), DbErr> {
        self.into_inner()?.rollback().await
    }

    /// Wait up to `grace` for every other holder to let go, then roll back.
    pub async fn rollback_eventually(self, grace: Duration) -> Result<(), DbErr> {
        let deadline = Instant::now() + grace;

        while self.strong_count() > 1 {
            if Instant::now() >= deadline {
                return Err(DbErr::Custom(ERR_TXN_STILL_SHARED.to_string()));
            }
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        self.rollback().await
    }

    fn into_inner(self) -> Result<DatabaseTransaction, DbErr> {
        Arc::try_unwrap(self.0).map_err(|_| DbErr::Custom(ERR_TXN_STILL_SHARED.to_string()))
    }
}

#[derive(Clone)]
enum Target {
    Conn(DatabaseConnection),
    Txn(SharedTxn),
}

/// The database a query should be issued against: either a plain connection
/// or an active transaction.
///
/// A handle resolved from a context with row locking enabled carries that
/// flag; [`DbHandle::lock`] turns a select into its `FOR UPDATE` form.
#[derive(Clone)]
pub struct DbHandle {
    target: Target,
    row_locking: bool,
}

impl DbHandle {
    pub fn connection(conn: DatabaseConnection) -> Self {
        Self {
            target: Target::Conn(conn),
            row_locking: false,
        }
    }

    pub fn transaction(txn: SharedTxn) -> Self {
        Self {
            target: Target::Txn(txn),
            row_locking: false,
        }
    }

    pub(crate) fn with_row_locking(mut self, enabled: bool) -> Self {
        self.row_locking = enabled;
        self
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self.target, Target::Txn(_))
    }

    pub fn shared_txn(&self) -> Option<&SharedTxn> {
        match &self.target {
            Target::Txn(txn) => Some(txn),
            Target::Conn(_) => None,
        }
    }

    pub fn as_connection(&self) -> Option<&DatabaseConnection> {
        match &self.target {
            Target::Conn(conn) => Some(conn),
            Target::Txn(_) => None,
        }
    }

    pub fn is_row_locking(&self) -> bool {
        self.row_locking
    }

    /// Apply exclusive row locking to `query` when this handle asks for it.
    pub fn lock<Q: QuerySelect>(&self, query: Q) -> Q {
        if self.row_locking {
            query.lock_exclusive()
        } else {
            query
        }
    }

    /// Begin a transaction (a savepoint when this handle already is one).
    pub async fn begin(&self) -> Result<DatabaseTransaction, DbErr> {
        match &self.target {
            Target::Conn(conn) => conn.begin().await,
            Target::Txn(txn) => txn.transaction().begin().await,
        }
    }
}

impl From<DatabaseConnection> for DbHandle {
    fn from(conn: DatabaseConnection) -> Self {
        Self::connection(conn)
    }
}

impl From<SharedTxn> for DbHandle {
    fn from(txn: SharedTxn) -> Self {
        Self::transaction(txn)
    }
}

impl fmt::Debug for DbHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.target {
            Target::Conn(_) => "connection",
            Target::Txn(_) => "transaction",
        };
        f.debug_struct("DbHandle")
            .field("kind", &kind)
            .field("row_locking", &self.row_locking)
            .finish()
    }
}

#[async_trait::async_trait]
impl ConnectionTrait for DbHandle {
    fn get_database_backend(&self) -> DbBackend {
        match &self.target {
            Target::Conn(conn) => conn.get_database_backend(),
            Target::Txn(txn) => txn.transaction().get_database_backend(),
        }
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        match &self.target {
            Target::Conn(conn) => conn.execute(stmt).await,
            Target::Txn(txn) => txn.transaction().execute(stmt).await,
        }
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        match &self.target {
            Target::Conn(conn) => conn.execute_unprepared(sql).await,
            Target::Txn(txn) => txn.transaction().execute_unprepared(sql).await,
        }
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        match &self.target {
            Target::Conn(conn) => conn.query_one(stmt).await,
            Target::Txn(txn) => txn.transaction().query_one(stmt).await,
        }
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        match &self.target {
            Target::Conn(conn) => conn.query_all(stmt).await,
            Target::Txn(txn) => txn.transaction().query_all(stmt).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::DatabaseConnection;

    use super::*;

    #[test]
    fn connection_handle_reports_its_kind() {
        let handle = DbHandle::from(DatabaseConnection::Disconnected);
        assert!(!handle.is_transaction());
        assert!(handle.as_connection().is_some());
        assert!(handle.shared_txn().is_none());
        assert!(!handle.is_row_locking());
    }

    #[test]
    fn row_locking_flag_is_carried() {
        let handle = DbHandle::connection(DatabaseConnection::Disconnected).with_row_locking(true);
        assert!(handle.is_row_locking());
        assert_eq!(
            format!("{handle:?}"),
            "DbHandle { kind: \"connection\", row_locking: true }"
        );
    }
}
