//! Unique test database names.
//!
//! Names are `test_db_<n>` with `n` uniform in `[0, NAME_SPACE)`. Names held
//! by live sessions in this process are never handed out twice: a draw that
//! hits a reserved number is redrawn. Collisions with other processes are
//! not detected.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::Rng;
use tracing::trace;

use crate::error::TestDbError;

pub const DB_NAME_PREFIX: &str = "test_db_";
pub const NAME_SPACE: u32 = 10_000_000;
pub const MAX_DRAWS: usize = 16;

static LIVE_NAMES: Lazy<NameRegistry> = Lazy::new(|| NameRegistry::with_space(NAME_SPACE));

/// Format the database name for draw `n`.
pub fn db_name(n: u32) -> String {
    format!("{DB_NAME_PREFIX}{n}")
}

/// A single unreserved draw from the full name space.
pub fn draw_name() -> String {
    db_name(rand::rng().random_range(0..NAME_SPACE))
}

/// Registry of database names currently in use.
#[derive(Clone)]
pub struct NameRegistry {
    space: u32,
    live: Arc<Mutex<HashSet<u32>>>,
}

impl NameRegistry {
    pub fn with_space(space: u32) -> Self {
        Self {
            space: space.max(1),
            live: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The process-wide registry used by the provisioner.
    pub fn global() -> Self {
        LIVE_NAMES.clone()
    }

    pub fn reserve(&self) -> Result<ReservedName, TestDbError> {
        let mut rng = rand::rng();
        let mut live = self.live.lock();

        for attempt in 1..=MAX_DRAWS {
            let n = rng.random_range(0..self.space);
            if live.insert(n) {
                return Ok(ReservedName {
                    n,
                    name: db_name(n),
                    live: self.live.clone(),
                });
            }
            trace!(naming = "redraw", attempt = attempt, n = n);
        }

        Err(TestDbError::NameSpaceExhausted {
            attempts: MAX_DRAWS,
        })
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

/// A database name held by one session; released when dropped.
#[derive(Debug)]
pub struct ReservedName {
    n: u32,
    name: String,
    live: Arc<Mutex<HashSet<u32>>>,
}

impl ReservedName {
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl Drop for ReservedName {
    fn drop(&mut self) {
        self.live.lock().remove(&self.n);
    }
}
