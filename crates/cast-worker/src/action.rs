//! The action abstraction: one named, cancelable pipeline step.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cast_models::ActionType;

use crate::cancel::CancelHandle;
use crate::context::JobContext;
use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// The work an action performs.
///
/// Implementations read their inputs from `ctx`, return the extended
/// context on success, and bind every blocking operation to `cancel`.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn run(
        &self,
        ctx: JobContext,
        cancel: CancellationToken,
        log: &JobLogger,
    ) -> WorkerResult<JobContext>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(JobContext, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = WorkerResult<JobContext>> + Send + 'static,
{
    async fn run(
        &self,
        ctx: JobContext,
        cancel: CancellationToken,
        _log: &JobLogger,
    ) -> WorkerResult<JobContext> {
        (self.0)(ctx, cancel).await
    }
}

pub struct Action {
    kind: ActionType,
    handle: OnceLock<CancelHandle>,
    canceled: AtomicBool,
    handler: Box<dyn ActionHandler>,
}

impl Action {
    pub fn new(kind: ActionType, handler: impl ActionHandler + 'static) -> Self {
        Self {
            kind,
            handle: OnceLock::new(),
            canceled: AtomicBool::new(false),
            handler: Box::new(handler),
        }
    }

    /// Wrap a closure as an action.
    pub fn from_fn<F, Fut>(kind: ActionType, f: F) -> Self
    where
        F: Fn(JobContext, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkerResult<JobContext>> + Send + 'static,
    {
        Self::new(kind, FnHandler(f))
    }

    pub fn kind(&self) -> ActionType {
        self.kind
    }

    /// `None` until the action has started.
    pub fn handle(&self) -> Option<&CancelHandle> {
        self.handle.get()
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Prevent the action from starting. Does not touch a running action.
    pub fn mark_canceled(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Record the handle for this run. An action runs at most once.
    pub(crate) fn start(&self, token: CancellationToken) -> &CancelHandle {
        self.handle.get_or_init(|| CancelHandle::new(token))
    }

    pub(crate) async fn execute(
        &self,
        ctx: JobContext,
        cancel: CancellationToken,
        log: &JobLogger,
    ) -> WorkerResult<JobContext> {
        self.handler.run(ctx, cancel, log).await
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("kind", &self.kind)
            .field("canceled", &self.is_canceled())
            .field("started", &self.handle.get().is_some())
            .finish()
    }
}
