//! Task-local ambient [`TxContext`].
//!
//! Code that cannot take a context parameter (extractors, trait impls owned
//! by other crates) reads the context installed by the nearest enclosing
//! [`scope`].

use std::future::Future;

use tokio::task_local;

use crate::context::TxContext;

task_local! {
    static TX_CONTEXT: TxContext;
}

/// The context of the current task, or an empty one outside any scope.
pub fn current() -> TxContext {
    TX_CONTEXT
        .try_with(|ctx| ctx.clone())
        .unwrap_or_default()
}

/// Run `future` with `ctx` as the ambient context.
pub async fn scope<F, R>(ctx: TxContext, future: F) -> R
where
    F: Future<Output = R>,
{
    TX_CONTEXT.scope(ctx, future).await
}
