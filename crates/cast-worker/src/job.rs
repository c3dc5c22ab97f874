//! A job: an ordered sequence of actions run for one request.

use std::time::Instant;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use cast_models::{ActionType, JobId, JobState};

use crate::action::Action;
use crate::context::JobContext;
use crate::logging::JobLogger;
use crate::metrics;

pub struct Job {
    id: JobId,
    action_id: Option<String>,
    actions: Vec<Action>,
    logger: JobLogger,
    token: CancellationToken,
    state: watch::Sender<JobState>,
}

impl Job {
    pub fn new(id: JobId, actions: Vec<Action>, logger: JobLogger) -> Self {
        let (state, _) = watch::channel(JobState::Created);
        Self {
            id,
            action_id: None,
            actions,
            logger,
            token: CancellationToken::new(),
            state,
        }
    }

    /// Tag the job with the control plane's action identifier.
    /// An empty identifier leaves the job untagged.
    pub fn with_action_id(mut self, action_id: Option<String>) -> Self {
        self.action_id = action_id.filter(|id| !id.is_empty());
        self
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn action_id(&self) -> Option<&str> {
        self.action_id.as_deref()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait(&self) -> JobState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }

    /// Run every action in order, stopping at the first failure.
    ///
    /// Each action gets a fresh child of the job token, so resolving one
    /// action's handle never reaches its successors.
    pub async fn run(&self, ctx: JobContext) -> JobState {
        self.state.send_replace(JobState::Running);
        self.logger
            .log_start(&format!("{} actions", self.actions.len()));

        let mut ctx = ctx;
        let mut outcome = JobState::Succeeded;

        for action in &self.actions {
            let kind = action.kind();
            if action.is_canceled() {
                self.logger
                    .log_progress(&format!("Skipping canceled action {}", kind));
                continue;
            }

            let handle = action.start(self.token.child_token());
            // Cancel may have landed between the check above and the handle
            // being recorded, in which case it only set the flag.
            if action.is_canceled() {
                handle.cancel("canceled before start");
                self.logger
                    .log_progress(&format!("Skipping canceled action {}", kind));
                continue;
            }

            self.logger.log_progress(&format!("Running {}", kind));
            let started = Instant::now();

            match action
                .execute(ctx.clone(), handle.token().clone(), &self.logger)
                .await
            {
                Ok(next) => {
                    handle.complete();
                    metrics::record_action(kind, "succeeded", started.elapsed().as_secs_f64());
                    ctx = next;
                }
                Err(e) if e.is_cancelled() => {
                    self.logger.log_cancelled(&format!("{}: {}", kind, e));
                    handle.cancel(e.to_string());
                    metrics::record_action(kind, "canceled", started.elapsed().as_secs_f64());
                    outcome = JobState::Canceled;
                    break;
                }
                Err(e) => {
                    self.logger.log_error(&format!("{} failed: {}", kind, e));
                    handle.fail(&e);
                    metrics::record_action(kind, "failed", started.elapsed().as_secs_f64());
                    outcome = JobState::Failed;
                    break;
                }
            }
        }

        match outcome {
            JobState::Succeeded => self.logger.log_completion("all actions finished"),
            other => self.logger.log_progress(&format!("Job ended: {}", other)),
        }
        metrics::record_job(outcome);
        self.state.send_replace(outcome);
        outcome
    }

    /// Settle a job whose run task died without reaching a terminal state.
    pub fn abandon(&self, reason: &str) -> JobState {
        let settled = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = JobState::Failed;
            true
        });
        if settled {
            self.logger.log_error(&format!("Job aborted: {}", reason));
            metrics::record_job(JobState::Failed);
        }
        self.state()
    }

    /// Cancel every action whose type is in `kinds`, latest first.
    ///
    /// Started actions have their handle fired; every matching action is
    /// flagged so it can no longer start. Returns how many matched.
    pub fn cancel(&self, reason: &str, kinds: &[ActionType]) -> usize {
        let mut matched = 0;
        for action in self.actions.iter().rev() {
            if !kinds.contains(&action.kind()) {
                continue;
            }
            action.mark_canceled();
            if let Some(handle) = action.handle() {
                handle.cancel(reason);
            }
            matched += 1;
        }
        if matched > 0 {
            self.logger
                .log_cancelled(&format!("{} action(s): {}", matched, reason));
        }
        matched
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("action_id", &self.action_id)
            .field("state", &self.state())
            .field("actions", &self.actions)
            .finish()
    }
}
