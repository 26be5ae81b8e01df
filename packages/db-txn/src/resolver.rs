use std::sync::Arc;

use crate::context::TxContext;
use crate::handle::DbHandle;

/// Per-call database lookup held by repositories.
pub type DbResolver = Arc<dyn Fn(&TxContext) -> DbHandle + Send + Sync>;

/// Use the ambient transaction when the context has one, `default` otherwise.
///
/// This is the resolver repositories are normally built with: the same
/// repository method runs inside or outside a business transaction unchanged.
pub fn resolve(default: impl Into<DbHandle>) -> DbResolver {
    let default = default.into();
    Arc::new(move |ctx: &TxContext| ctx.transaction().unwrap_or_else(|| default.clone()))
}

/// Always use `conn`, whatever the context carries.
pub fn fixed(conn: impl Into<DbHandle>) -> DbResolver {
    let conn = conn.into();
    Arc::new(move |_: &TxContext| conn.clone())
}

#[cfg(test)]
mod tests {
    use sea_orm::DatabaseConnection;

    use super::*;

    #[test]
    fn resolve_without_transaction_yields_default() {
        let resolver = resolve(DatabaseConnection::Disconnected);
        let handle = resolver(&TxContext::new());
        assert!(!handle.is_transaction());
    }

    #[test]
    fn fixed_ignores_row_locking_context() {
        let resolver = fixed(DatabaseConnection::Disconnected);
        let handle = resolver(&TxContext::new().with_row_locking());
        assert!(!handle.is_transaction());
        assert!(!handle.is_row_locking());
    }
}
