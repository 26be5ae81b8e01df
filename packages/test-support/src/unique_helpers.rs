//! Unique test data
//!
//! Rows written by concurrently running tests are tagged with ULID-suffixed
//! strings so assertions never match another test's data.

use ulid::Ulid;

/// Generate a unique string in the format `{prefix}-{ulid}`.
///
/// ```
/// use test_support::unique_helpers::unique_str;
///
/// let a = unique_str("widget");
/// let b = unique_str("widget");
/// assert_ne!(a, b);
/// assert!(a.starts_with("widget-"));
/// ```
pub fn unique_str(prefix: &str) -> String {
    format!("{}-{}", prefix, Ulid::new())
}
