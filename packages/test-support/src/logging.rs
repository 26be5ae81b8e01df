//! Test logging for the workspace's test binaries.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Filter used when neither `TEST_LOG` nor `RUST_LOG` is set.
///
/// Keeps dependencies at `warn` while still showing the provisioning
/// lifecycle (`testdb=` events) and base connection reuse (`base_cache=`
/// events) emitted by `db_testing`, plus anything `db_txn` reports.
pub const DEFAULT_FILTER: &str = "warn,db_testing=debug,db_txn=info";

/// Pick the filter directive: `TEST_LOG` wins over `RUST_LOG`, and blank
/// values count as unset.
pub fn filter_directive(test_log: Option<String>, rust_log: Option<String>) -> String {
    test_log
        .filter(|v| !v.trim().is_empty())
        .or_else(|| rust_log.filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the subscriber once per test binary; later calls are no-ops.
///
/// Output goes through the test writer so the harness captures it.
pub fn init() {
    INITIALIZED.get_or_init(|| {
        let directive = filter_directive(
            std::env::var("TEST_LOG").ok(),
            std::env::var("RUST_LOG").ok(),
        );
        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .without_time()
            .try_init()
            .ok();
    });
}
