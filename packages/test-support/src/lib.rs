//! Test support utilities
//!
//! Helpers shared by the integration suites of the workspace: one-time
//! tracing initialisation and unique test-data strings.

pub mod logging;
pub mod unique_helpers;

pub use unique_helpers::unique_str;
