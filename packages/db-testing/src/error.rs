use sea_orm::DbErr;
use thiserror::Error;

/// Failures while provisioning or tearing down a test database.
///
/// Every variant names the stage that failed so a report is actionable
/// without re-running the test.
#[derive(Debug, Error)]
pub enum TestDbError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unknown test environment: '{0}'")]
    UnknownEnvironment(String),

    #[error("failed to connect to base database {url}: {source}")]
    BaseConnect { url: String, source: DbErr },

    #[error("liveness check failed against {url}: {source}")]
    Liveness { url: String, source: DbErr },

    #[error("failed to create database {name}: {source}")]
    CreateDatabase { name: String, source: DbErr },

    #[error("failed to connect to database {name}: {source}")]
    Connect { name: String, source: DbErr },

    #[error("Post-init hook {index} failed: {source}")]
    Hook { index: usize, source: DbErr },

    #[error("failed to begin wrapping transaction: {0}")]
    BeginTransaction(DbErr),

    #[error("shared database {database} still held by another session after {waited_secs}s")]
    SharedBusy { database: String, waited_secs: u64 },

    #[error("no free database name after {attempts} draws")]
    NameSpaceExhausted { attempts: usize },

    #[error("cleanup step '{stage}' failed: {source}")]
    Cleanup { stage: String, source: DbErr },
}

impl TestDbError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
