//! At most one live session per shared SQLite file in this process.
//!
//! SQLite allows a single writer, so two wrapped sessions on the same file
//! would block each other's writes until the busy timeout fails one of them.
//! Sessions on one file are queued instead; the guard is released by the
//! session's cleanup stack.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::TestDbError;

static FILE_LOCKS: Lazy<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub type SharedGuard = OwnedMutexGuard<()>;

fn lock_for(database: &str) -> Arc<AsyncMutex<()>> {
    FILE_LOCKS
        .lock()
        .entry(database.to_string())
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

/// Wait up to `wait` for exclusive use of `database`.
pub async fn acquire(database: &str, wait: Duration) -> Result<SharedGuard, TestDbError> {
    let lock = lock_for(database);
    match tokio::time::timeout(wait, lock.lock_owned()).await {
        Ok(guard) => {
            debug!(shared_lock = "acquired", database = database);
            Ok(guard)
        }
        Err(_) => Err(TestDbError::SharedBusy {
            database: database.to_string(),
            waited_secs: wait.as_secs(),
        }),
    }
}
