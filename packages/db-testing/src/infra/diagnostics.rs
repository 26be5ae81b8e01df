use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

/// Relaxed counters describing how a [`crate::infra::ConnectionCache`] was used.
#[derive(Debug, Default)]
pub struct CacheCounters {
    acquire_hit: AtomicUsize,
    acquire_miss: AtomicUsize,
    open_failed: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheSnapshot {
    pub acquire_hit: usize,
    pub acquire_miss: usize,
    pub open_failed: usize,
}

impl CacheCounters {
    pub fn hit(&self) {
        self.acquire_hit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.acquire_miss.fetch_add(1, Ordering::Relaxed);
    }

    pub fn open_failed(&self) {
        self.open_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            acquire_hit: self.acquire_hit.load(Ordering::Relaxed),
            acquire_miss: self.acquire_miss.load(Ordering::Relaxed),
            open_failed: self.open_failed.load(Ordering::Relaxed),
        }
    }

    pub fn log_snapshot(&self, label: &str) {
        let s = self.snapshot();
        info!(
            label = label,
            acquire_hit = s.acquire_hit,
            acquire_miss = s.acquire_miss,
            open_failed = s.open_failed,
            "base_cache=counters"
        );
    }
}
