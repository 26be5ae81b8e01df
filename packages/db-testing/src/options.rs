//! Option set for a provisioning call.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use sea_orm::{DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

type HookFn = dyn for<'a> Fn(&'a DatabaseConnection) -> BoxFuture<'a, Result<(), DbErr>> + Send + Sync;

/// A post-init callback run against the live connection before any
/// transaction wrapping.
#[derive(Clone)]
pub struct Hook {
    f: Arc<HookFn>,
}

impl Hook {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a DatabaseConnection) -> BoxFuture<'a, Result<(), DbErr>>
            + Send
            + Sync
            + 'static,
    {
        Self { f: Arc::new(f) }
    }

    pub async fn run(&self, conn: &DatabaseConnection) -> Result<(), DbErr> {
        (self.f)(conn).await
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook")
    }
}

/// Hook applying every pending migration of `M`.
pub fn migrations_hook<M>() -> Hook
where
    M: MigratorTrait + 'static,
{
    Hook::new(|db| Box::pin(async move { M::up(db, None).await }))
}

/// One discrete configuration effect.
#[derive(Debug, Clone)]
pub enum DbOption {
    /// Turn off SQL statement logging on the dedicated connection
    DebugOff,
    /// Hand out the live connection instead of a rolled-back transaction
    NoWrapInTransaction,
    /// Append a post-init hook
    WithHook(Hook),
}

#[derive(Debug, Clone, Default)]
pub struct TestDbOptions {
    debug_off: bool,
    no_wrap_in_transaction: bool,
    hooks: Vec<Hook>,
}

impl TestDbOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug_off(self) -> Self {
        self.apply(DbOption::DebugOff)
    }

    pub fn no_wrap_in_transaction(self) -> Self {
        self.apply(DbOption::NoWrapInTransaction)
    }

    pub fn with_hook(self, hook: Hook) -> Self {
        self.apply(DbOption::WithHook(hook))
    }

    pub fn apply(mut self, option: DbOption) -> Self {
        match option {
            DbOption::DebugOff => self.debug_off = true,
            DbOption::NoWrapInTransaction => self.no_wrap_in_transaction = true,
            DbOption::WithHook(hook) => self.hooks.push(hook),
        }
        self
    }

    pub fn is_debug_off(&self) -> bool {
        self.debug_off
    }

    /// Whether the dedicated connection logs SQL statements.
    pub fn logs_statements(&self) -> bool {
        !self.debug_off
    }

    pub fn wraps_in_transaction(&self) -> bool {
        !self.no_wrap_in_transaction
    }

    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }
}

impl FromIterator<DbOption> for TestDbOptions {
    fn from_iter<I: IntoIterator<Item = DbOption>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), Self::apply)
    }
}
