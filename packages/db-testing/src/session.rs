//! Ordered cleanup stack owned by one test session.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use sea_orm::DbErr;
use tracing::{debug, warn};

use crate::error::TestDbError;

type Action = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), DbErr>> + Send>;

struct Deferred {
    label: String,
    action: Action,
}

/// Release actions paired with each acquisition of a session.
///
/// Actions run in reverse registration order. A failing action does not
/// stop the ones after it; teardown reports the first failure. Each action
/// runs at most once, so a second teardown is a no-op.
#[derive(Default)]
pub struct TestSession {
    stack: Vec<Deferred>,
    torn_down: bool,
}

impl TestSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a release action onto the stack.
    pub fn defer<F, Fut>(&mut self, label: impl Into<String>, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), DbErr>> + Send + 'static,
    {
        let label = label.into();
        debug!(session = "defer", label = %label);
        self.stack.push(Deferred {
            label,
            action: Box::new(move || Box::pin(f())),
        });
    }

    pub fn pending(&self) -> usize {
        self.stack.len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Unwind every pending action, newest first.
    pub async fn teardown(&mut self) -> Result<(), TestDbError> {
        if self.torn_down && self.stack.is_empty() {
            debug!(session = "teardown_repeat");
            return Ok(());
        }
        self.torn_down = true;

        let mut first_err = None;
        while let Some(Deferred { label, action }) = self.stack.pop() {
            debug!(session = "cleanup", label = %label);
            if let Err(source) = action().await {
                warn!(session = "cleanup_failed", label = %label, error = %source);
                if first_err.is_none() {
                    first_err = Some(TestDbError::Cleanup {
                        stage: label,
                        source,
                    });
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for TestSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.stack.iter().map(|d| d.label.as_str()).collect();
        f.debug_struct("TestSession")
            .field("pending", &labels)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}
