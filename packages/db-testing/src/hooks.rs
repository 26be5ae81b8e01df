use sea_orm::DatabaseConnection;
use tracing::{debug, error};

use crate::error::TestDbError;
use crate::options::Hook;

/// Run `hooks` in order against the live connection.
///
/// Stops at the first failure; the error carries the hook's 1-based position.
/// Effects of hooks that already ran are left in place.
pub async fn run_hooks(conn: &DatabaseConnection, hooks: &[Hook]) -> Result<(), TestDbError> {
    for (i, hook) in hooks.iter().enumerate() {
        let index = i + 1;
        debug!("Running post-init hook {index}");
        if let Err(source) = hook.run(conn).await {
            error!(hook = index, error = %source, "post-init hook failed");
            return Err(TestDbError::Hook { index, source });
        }
    }
    Ok(())
}
