//! Per-action cancellation handles.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Why an action's token was fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelCause {
    /// The action finished normally
    Completed,
    /// The action failed with this error
    Failed(String),
    /// Someone asked the action to stop
    Canceled(String),
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::Completed => f.write_str("completed"),
            CancelCause::Failed(e) => write!(f, "failed: {}", e),
            CancelCause::Canceled(r) => write!(f, "canceled: {}", r),
        }
    }
}

/// A cancellation token plus the cause it was first fired with.
///
/// Only the first resolution is recorded; later ones still fire the token
/// (a no-op by then) but keep the original cause.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
    cause: Arc<OnceLock<CancelCause>>,
}

impl CancelHandle {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            cause: Arc::new(OnceLock::new()),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fire the token with `cause`. Returns whether this call set the cause.
    pub fn resolve(&self, cause: CancelCause) -> bool {
        let first = self.cause.set(cause).is_ok();
        self.token.cancel();
        first
    }

    pub fn complete(&self) -> bool {
        self.resolve(CancelCause::Completed)
    }

    pub fn fail(&self, error: impl fmt::Display) -> bool {
        self.resolve(CancelCause::Failed(error.to_string()))
    }

    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        self.resolve(CancelCause::Canceled(reason.into()))
    }

    pub fn cause(&self) -> Option<&CancelCause> {
        self.cause.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.cause.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_resolution_wins() {
        let handle = CancelHandle::new(CancellationToken::new());
        assert!(!handle.is_resolved());

        assert!(handle.cancel("stream end"));
        assert!(!handle.complete());

        assert_eq!(handle.cause(), Some(&CancelCause::Canceled("stream end".into())));
        assert!(handle.token().is_cancelled());
    }

    #[test]
    fn test_completion_fires_token() {
        let handle = CancelHandle::new(CancellationToken::new());
        handle.complete();
        assert!(handle.token().is_cancelled());
        assert_eq!(handle.cause(), Some(&CancelCause::Completed));
    }

    #[test]
    fn test_parent_token_is_unaffected() {
        let parent = CancellationToken::new();
        let handle = CancelHandle::new(parent.child_token());
        handle.fail("exit status 1");
        assert!(!parent.is_cancelled());
        assert_eq!(handle.cause().unwrap().to_string(), "failed: exit status 1");
    }
}
