//! Disposable databases for tests.
//!
//! A [`Provisioner`] resolves an [`Environment`] to connection parameters,
//! takes the cached base connection, creates a uniquely named database,
//! runs the post-init hooks and hands back a [`TestDb`] whose handle is
//! (by default) a transaction that is rolled back on teardown.
//!
//! Base connections are cached for the lifetime of the process and never
//! closed; everything a session acquires is released by its cleanup stack.

pub mod config;
pub mod error;
pub mod hooks;
pub mod infra;
pub mod naming;
pub mod options;
pub mod provision;
pub mod session;

use std::future::Future;

pub use config::{ConnectionParams, DbKind, EnvRegistry, Environment};
pub use db_txn::DbHandle;
pub use error::TestDbError;
pub use infra::{CacheSnapshot, ConnectionCache};
pub use naming::{NameRegistry, ReservedName, DB_NAME_PREFIX, NAME_SPACE};
pub use options::{migrations_hook, DbOption, Hook, TestDbOptions};
pub use provision::{Provisioner, TestDb};
pub use session::TestSession;

/// Provision with parameters read from the environment.
pub async fn provision(env: Environment, options: TestDbOptions) -> Result<Option<TestDb>, TestDbError> {
    Provisioner::from_env()?.provision(env, options).await
}

/// [`Provisioner::with_test_db`] with parameters read from the environment.
pub async fn with_test_db<F, Fut, R>(
    env: Environment,
    options: TestDbOptions,
    body: F,
) -> Result<Option<R>, TestDbError>
where
    F: FnOnce(DbHandle) -> Fut,
    Fut: Future<Output = R>,
{
    Provisioner::from_env()?.with_test_db(env, options, body).await
}
