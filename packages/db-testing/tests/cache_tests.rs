mod common;

use std::sync::Arc;

use db_testing::{CacheSnapshot, ConnectionCache};
use futures::future::join_all;

#[tokio::test]
async fn concurrent_first_acquire_opens_once() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("base.db").display());
    let cache = Arc::new(ConnectionCache::new());

    let results = join_all((0..8).map(|_| {
        let cache = cache.clone();
        let url = url.clone();
        async move { cache.acquire(&url).await }
    }))
    .await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(cache.len().await, 1);
    assert_eq!(
        cache.stats(),
        CacheSnapshot {
            acquire_hit: 7,
            acquire_miss: 1,
            open_failed: 0,
        }
    );
}

#[tokio::test]
async fn distinct_urls_get_distinct_entries() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ConnectionCache::new();

    for name in ["one.db", "two.db", "one.db"] {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join(name).display());
        cache.acquire(&url).await.unwrap();
    }

    assert_eq!(cache.len().await, 2);
    assert_eq!(cache.stats().acquire_hit, 1);
}

#[tokio::test]
async fn failed_open_is_retried_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing").join("base.db");
    let url = format!("sqlite://{}?mode=rwc", missing.display());
    let cache = ConnectionCache::new();

    assert!(cache.acquire(&url).await.is_err());
    assert!(cache.acquire(&url).await.is_err());
    assert!(cache.is_empty().await);
    assert_eq!(cache.stats().open_failed, 2);

    std::fs::create_dir_all(missing.parent().unwrap()).unwrap();
    assert!(cache.acquire(&url).await.is_ok());
    assert_eq!(cache.len().await, 1);
    cache.log_stats("failed_open_is_retried_not_cached");
}
