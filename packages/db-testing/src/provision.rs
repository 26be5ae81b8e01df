use std::future::Future;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use db_txn::{DbHandle, SharedTxn};
use futures::future::BoxFuture;
use futures::FutureExt;
use sea_orm::{ConnectOptions, DatabaseConnection, DbErr};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};

use crate::config::{ConnectionParams, DbKind, EnvRegistry, Environment};
use crate::error::TestDbError;
use crate::hooks::run_hooks;
use crate::infra::cache::open_base;
use crate::infra::{admin, shared_lock, ConnectionCache};
use crate::naming::NameRegistry;
use crate::options::TestDbOptions;
use crate::session::TestSession;

/// How long the wrapping rollback waits for stray handle clones to be dropped.
pub const ROLLBACK_GRACE: Duration = Duration::from_secs(5);
/// Upper bound for closing a dedicated connection during cleanup.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a shared SQLite session waits for the previous one on the same file.
pub const SHARED_LOCK_WAIT: Duration = Duration::from_secs(60);

/// Creates isolated databases (or opens the shared one) for single tests.
#[derive(Clone)]
pub struct Provisioner {
    registry: EnvRegistry,
    cache: Arc<ConnectionCache>,
    names: NameRegistry,
}

impl Provisioner {
    /// Provisioner over `registry` using the process-wide connection cache
    /// and name registry.
    pub fn new(registry: EnvRegistry) -> Self {
        Self {
            registry,
            cache: ConnectionCache::global(),
            names: NameRegistry::global(),
        }
    }

    pub fn from_env() -> Result<Self, TestDbError> {
        Ok(Self::new(EnvRegistry::from_env()?))
    }

    pub fn with_cache(mut self, cache: Arc<ConnectionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_names(mut self, names: NameRegistry) -> Self {
        self.names = names;
        self
    }

    pub fn registry(&self) -> &EnvRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ConnectionCache> {
        &self.cache
    }

    /// Provision a database for one test.
    ///
    /// `Ok(None)` means the shared environment is unreachable from here and
    /// the caller should skip. On any error, everything acquired so far has
    /// already been released.
    pub async fn provision(
        &self,
        env: Environment,
        options: TestDbOptions,
    ) -> Result<Option<TestDb>, TestDbError> {
        match env {
            Environment::Isolated => self.provision_isolated(options).await.map(Some),
            Environment::Shared => self.provision_shared(options).await,
        }
    }

    /// [`Provisioner::provision`] with the environment given by name.
    pub async fn provision_named(
        &self,
        env: &str,
        options: TestDbOptions,
    ) -> Result<Option<TestDb>, TestDbError> {
        let env: Environment = env.parse()?;
        self.provision(env, options).await
    }

    /// Provision, run `body` with the handle, then tear the session down.
    ///
    /// Cleanup runs whether `body` returns or panics; a panic is resumed
    /// after cleanup. Returns `Ok(None)` without running `body` when the
    /// environment is unavailable.
    pub async fn with_test_db<F, Fut, R>(
        &self,
        env: Environment,
        options: TestDbOptions,
        body: F,
    ) -> Result<Option<R>, TestDbError>
    where
        F: FnOnce(DbHandle) -> Fut,
        Fut: Future<Output = R>,
    {
        let Some(db) = self.provision(env, options).await? else {
            return Ok(None);
        };
        let (handle, mut session) = db.into_parts();

        let outcome = AssertUnwindSafe(async move { body(handle).await })
            .catch_unwind()
            .await;
        let cleanup = session.teardown().await;

        match outcome {
            Ok(value) => {
                cleanup?;
                Ok(Some(value))
            }
            Err(panic) => {
                if let Err(e) = cleanup {
                    warn!(testdb = "cleanup_after_panic_failed", error = %e);
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn provision_isolated(&self, options: TestDbOptions) -> Result<TestDb, TestDbError> {
        let base = self.registry.params(Environment::Isolated);

        let admin_conn = self
            .cache
            .acquire(&base.url())
            .await
            .map_err(|source| TestDbError::BaseConnect {
                url: base.redacted_url(),
                source,
            })?;
        let version = admin::server_version(&admin_conn, base.kind)
            .await
            .map_err(|source| TestDbError::Liveness {
                url: base.redacted_url(),
                source,
            })?;
        debug!(testdb = "base_alive", version = %version);

        let reserved = self.names.reserve()?;
        let name = reserved.as_str().to_string();
        admin::create_database(&admin_conn, &base, &name)
            .await
            .map_err(|source| TestDbError::CreateDatabase {
                name: name.clone(),
                source,
            })?;

        let mut session = TestSession::new();
        {
            let admin_conn = admin_conn.clone();
            let base = base.clone();
            let name = name.clone();
            session.defer("drop_database", move || async move {
                let _reserved = reserved;
                admin::drop_database(&admin_conn, &base, &name).await
            });
        }

        let params = base.with_database(&name);
        let opt = dedicated_options(Environment::Isolated, &params, &options);
        let conn = match admin::connect(opt).await {
            Ok(conn) => conn,
            Err(source) => {
                let err = TestDbError::Connect {
                    name: name.clone(),
                    source,
                };
                return Err(abandon(session, err).await);
            }
        };
        session.defer("close_connection", close_action(conn.clone()));

        let handle = match finish(&mut session, conn, &options).await {
            Ok(handle) => handle,
            Err(err) => return Err(abandon(session, err).await),
        };

        info!(testdb = "provisioned", env = %Environment::Isolated, database = %name, wrapped = handle.is_transaction());
        Ok(TestDb {
            handle,
            environment: Environment::Isolated,
            orphan: Some(OrphanDatabase { base, name: name.clone() }),
            database_name: name,
            params,
            session,
        })
    }

    async fn provision_shared(&self, options: TestDbOptions) -> Result<Option<TestDb>, TestDbError> {
        let params = self.registry.params(Environment::Shared);

        let file_guard = match params.kind {
            DbKind::Sqlite => Some(shared_lock::acquire(&params.database, SHARED_LOCK_WAIT).await?),
            DbKind::Postgres => None,
        };

        let opt = dedicated_options(Environment::Shared, &params, &options);
        let conn = match admin::connect(opt).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(testdb = "skip", env = %Environment::Shared, url = %params.redacted_url(), error = %e);
                return Ok(None);
            }
        };
        if let Err(e) = admin::server_version(&conn, params.kind).await {
            warn!(testdb = "skip", env = %Environment::Shared, url = %params.redacted_url(), error = %e);
            if let Err(close_err) = conn.close().await {
                debug!(testdb = "close_failed", error = %close_err);
            }
            return Ok(None);
        }

        let mut session = TestSession::new();
        if let Some(guard) = file_guard {
            session.defer("release_shared_file", move || async move {
                drop(guard);
                Ok(())
            });
        }
        session.defer("close_connection", close_action(conn.clone()));

        let handle = match finish(&mut session, conn, &options).await {
            Ok(handle) => handle,
            Err(err) => return Err(abandon(session, err).await),
        };

        info!(testdb = "provisioned", env = %Environment::Shared, database = %params.database, wrapped = handle.is_transaction());
        Ok(Some(TestDb {
            handle,
            environment: Environment::Shared,
            orphan: None,
            database_name: params.database.clone(),
            params,
            session,
        }))
    }
}

/// Options for the session's dedicated connection. Only isolated sessions
/// may create their database file; a missing shared database means skip.
fn dedicated_options(env: Environment, params: &ConnectionParams, options: &TestDbOptions) -> ConnectOptions {
    admin::dedicated_options(params, options.logs_statements(), env == Environment::Isolated)
}

/// Run the hooks, then wrap the connection in a transaction unless disabled.
async fn finish(
    session: &mut TestSession,
    conn: DatabaseConnection,
    options: &TestDbOptions,
) -> Result<DbHandle, TestDbError> {
    run_hooks(&conn, options.hooks()).await?;

    if !options.wraps_in_transaction() {
        return Ok(DbHandle::connection(conn));
    }

    let txn = SharedTxn::open(&conn)
        .await
        .map_err(TestDbError::BeginTransaction)?;
    let owned = txn.clone();
    session.defer("rollback", move || owned.rollback_eventually(ROLLBACK_GRACE));
    Ok(DbHandle::transaction(txn))
}

fn close_action(
    conn: DatabaseConnection,
) -> impl FnOnce() -> BoxFuture<'static, Result<(), DbErr>> + Send + 'static {
    move || {
        Box::pin(async move {
            match tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await {
                Ok(res) => res,
                Err(_) => Err(DbErr::Custom(format!(
                    "timed out after {}s closing connection",
                    CLOSE_TIMEOUT.as_secs()
                ))),
            }
        })
    }
}

/// Release a partially built session and hand back the error that stopped it.
async fn abandon(mut session: TestSession, err: TestDbError) -> TestDbError {
    warn!(testdb = "provision_failed", error = %err, pending = session.pending());
    if let Err(cleanup_err) = session.teardown().await {
        warn!(testdb = "cleanup_failed", error = %cleanup_err);
    }
    err
}

fn released_handle() -> DbHandle {
    DbHandle::connection(DatabaseConnection::Disconnected)
}

/// A database created for one session, recorded so it can still be dropped
/// when the session's own connections cannot be driven.
#[derive(Debug, Clone)]
struct OrphanDatabase {
    base: ConnectionParams,
    name: String,
}

impl OrphanDatabase {
    /// Drop the database through a base connection opened on the current
    /// runtime, terminating any session still attached to it.
    async fn drop_database(&self) -> Result<(), DbErr> {
        let conn = open_base(&self.base.url()).await?;
        let res = admin::force_drop_database(&conn, &self.base, &self.name).await;
        if let Err(e) = conn.close().await {
            debug!(testdb = "close_failed", error = %e);
        }
        res
    }
}

/// A provisioned test database.
///
/// Call [`TestDb::teardown`] when done. Dropping without teardown still
/// releases everything before `drop` returns: on a multi-threaded runtime the
/// cleanup stack is run in place; otherwise a helper thread with its own
/// runtime drops the database and the session's connections.
pub struct TestDb {
    handle: DbHandle,
    environment: Environment,
    orphan: Option<OrphanDatabase>,
    database_name: String,
    params: ConnectionParams,
    session: TestSession,
}

impl TestDb {
    /// Handle to run test queries against: the wrapping transaction, or the
    /// live connection when wrapping is disabled.
    pub fn handle(&self) -> &DbHandle {
        &self.handle
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Connection parameters of this session's database.
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Register an extra release action; it runs before the built-in ones.
    pub fn defer<F, Fut>(&mut self, label: impl Into<String>, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), DbErr>> + Send + 'static,
    {
        self.session.defer(label, f);
    }

    /// Run the cleanup stack. The handle is released first so the wrapping
    /// transaction can be rolled back.
    pub async fn teardown(mut self) -> Result<(), TestDbError> {
        drop(mem::replace(&mut self.handle, released_handle()));
        let mut session = mem::take(&mut self.session);
        session.teardown().await
    }

    /// Split into the handle and the session that owns its cleanup.
    pub fn into_parts(mut self) -> (DbHandle, TestSession) {
        let handle = mem::replace(&mut self.handle, released_handle());
        let session = mem::take(&mut self.session);
        (handle, session)
    }
}

impl std::fmt::Debug for TestDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDb")
            .field("environment", &self.environment)
            .field("database", &self.database_name)
            .field("handle", &self.handle)
            .field("session", &self.session)
            .finish()
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        if self.session.pending() == 0 {
            return;
        }
        drop(mem::replace(&mut self.handle, released_handle()));
        let mut session = mem::take(&mut self.session);
        let orphan = self.orphan.take();
        let database = self.database_name.clone();

        match Handle::try_current() {
            Ok(rt) if rt.runtime_flavor() == RuntimeFlavor::MultiThread => {
                let res = tokio::task::block_in_place(|| rt.block_on(session.teardown()));
                if let Err(e) = res {
                    warn!(testdb = "drop_cleanup_failed", database = %database, error = %e);
                }
            }
            _ => teardown_on_helper(session, orphan, database),
        }
    }
}

/// Release a dropped session from a dedicated thread and wait for it.
///
/// The caller's runtime may be the current-thread one blocked in `drop`, so
/// none of the session's connections can make progress. The database is
/// dropped through a fresh base connection, then the session (connections,
/// transaction, shared-file guard) is dropped inside the helper runtime.
fn teardown_on_helper(session: TestSession, orphan: Option<OrphanDatabase>, database: String) {
    let worker = std::thread::Builder::new()
        .name("testdb-cleanup".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!(testdb = "drop_cleanup_failed", database = %database, error = %e);
                    return;
                }
            };

            if let Some(orphan) = &orphan {
                match rt.block_on(orphan.drop_database()) {
                    Ok(()) => debug!(testdb = "dropped_orphan", database = %database),
                    Err(e) => {
                        warn!(testdb = "drop_cleanup_failed", database = %database, error = %e)
                    }
                }
            }

            let _entered = rt.enter();
            drop(session);
        });

    match worker {
        Ok(handle) => {
            if handle.join().is_err() {
                warn!(testdb = "drop_cleanup_panicked");
            }
        }
        Err(e) => warn!(testdb = "drop_cleanup_failed", error = %e),
    }
}
