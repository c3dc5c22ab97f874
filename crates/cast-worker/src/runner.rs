//! The worker agent: in-flight jobs, draining, and the control-plane
//! registration and heartbeat cycle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use cast_models::{
    ActionType, HeartbeatRequest, JobId, RegisterRequest, SelfStreamResponse, WorkerStatus,
};

use crate::action::Action;
use crate::actions::ActionFactory;
use crate::config::WorkerConfig;
use crate::context::JobContext;
use crate::control_plane::{self, ControlPlane};
use crate::diagnostics;
use crate::error::{WorkerError, WorkerResult};
use crate::job::Job;
use crate::logging::JobLogger;
use crate::metrics;
use crate::retry::{retry_linear, FailureTracker, RetryConfig, RetryResult};
use crate::table::JobTable;

/// Attempts per diagnostics push.
pub const HEARTBEAT_RETRIES: u32 = 5;

/// Consecutive periodic heartbeat failures logged before going quiet.
const HEARTBEAT_LOGGED_FAILURES: u32 = 3;

pub struct Runner {
    hostname: String,
    port: u16,
    version: String,
    control_plane: Arc<dyn ControlPlane>,
    factory: ActionFactory,
    jobs: Arc<JobTable>,
    draining: AtomicBool,
    register_retries: u32,
    backoff_unit: Duration,
    diagnostics_path: PathBuf,
}

impl Runner {
    /// `port` is the bound RPC port, which may differ from the configured one.
    pub fn new(
        config: &WorkerConfig,
        port: u16,
        control_plane: Arc<dyn ControlPlane>,
        factory: ActionFactory,
    ) -> Self {
        Self {
            hostname: config.hostname.clone(),
            port,
            version: config.version.clone(),
            control_plane,
            factory,
            jobs: Arc::new(JobTable::new()),
            draining: AtomicBool::new(false),
            register_retries: config.register_retries,
            backoff_unit: config.retry_backoff,
            diagnostics_path: config.recording_path.clone(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn factory(&self) -> &ActionFactory {
        &self.factory
    }

    /// Fresh actions for a pipeline of `kinds`.
    pub fn pipeline(&self, kinds: &[ActionType]) -> Vec<Action> {
        self.factory.pipeline(kinds)
    }

    /// Start a job running `actions` over `ctx` in the background.
    ///
    /// The job is removed from the table by a watcher task once its run task
    /// ends, including when an action panics.
    pub fn add_job(&self, ctx: JobContext, actions: Vec<Action>) -> WorkerResult<JobId> {
        if self.is_draining() {
            return Err(WorkerError::Draining);
        }

        let id = JobId::new();
        let logger = JobLogger::for_context(&id, &ctx);
        let span = logger.create_span();
        let job = Arc::new(
            Job::new(id.clone(), actions, logger)
                .with_action_id(ctx.action_id().ok().map(str::to_string)),
        );

        let count = self.jobs.insert(Arc::clone(&job));
        debug!("Job {} added, {} in flight", id, count);

        let running = Arc::clone(&job);
        let task = tokio::spawn(async move { running.run(ctx).await }.instrument(span));

        let jobs = Arc::clone(&self.jobs);
        tokio::spawn(async move {
            let state = match task.await {
                Ok(state) => state,
                Err(e) => job.abandon(&e.to_string()),
            };
            jobs.remove(job.id());
            debug!("Job {} {}, {} in flight", job.id(), state, jobs.len());
        });

        Ok(id)
    }

    /// Stop accepting jobs. In-flight jobs keep running.
    pub fn drain(&self) {
        if !self.draining.swap(true, Ordering::SeqCst) {
            info!("Draining: {} job(s) in flight", self.job_count());
        }
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> WorkerStatus {
        if self.is_draining() {
            WorkerStatus::Draining
        } else if self.job_count() > 0 {
            WorkerStatus::Working
        } else {
            WorkerStatus::Idle
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Observe the in-flight job count.
    pub fn subscribe_job_count(&self) -> watch::Receiver<usize> {
        self.jobs.subscribe()
    }

    /// Resolve until no job is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.jobs.subscribe();
        // The sender lives in the table we hold, so this cannot close.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Look a job up by job ID or control-plane action ID.
    pub fn find_job(&self, id: &str) -> Option<Arc<Job>> {
        self.jobs.find(id)
    }

    /// Targeted cancellation of the `kinds` actions of one job.
    pub fn cancel_actions(
        &self,
        id: &str,
        reason: &str,
        kinds: &[ActionType],
    ) -> WorkerResult<usize> {
        let job = self
            .find_job(id)
            .ok_or_else(|| WorkerError::JobNotFound(id.to_string()))?;
        Ok(job.cancel(reason, kinds))
    }

    /// Announce this worker to the control plane.
    ///
    /// Every attempt, successful or not, also kicks off a diagnostics push.
    /// Running out of attempts is fatal for the caller.
    pub async fn register(self: &Arc<Self>) -> WorkerResult<()> {
        let config = RetryConfig::new("registration")
            .with_budget(self.register_retries)
            .with_unit(self.backoff_unit)
            .with_final_backoff();
        let request = RegisterRequest {
            hostname: self.hostname.clone(),
            port: self.port,
        };
        let request = &request;

        let result = retry_linear(&config, |_| {
            let runner = Arc::clone(self);
            async move {
                let result = runner.control_plane.register(request).await;
                if result.is_err() {
                    metrics::record_control_plane_failure("register");
                }
                let pusher = Arc::clone(&runner);
                tokio::spawn(async move {
                    pusher.read_diagnostics().await;
                });
                result
            }
        })
        .await;

        match result {
            RetryResult::Success(()) => {
                info!(
                    "Registered {}:{} with the control plane",
                    self.hostname, self.port
                );
                Ok(())
            }
            RetryResult::Failed { error, attempts } => {
                error!("Registration failed after {} attempts: {}", attempts, error);
                Err(WorkerError::RegistrationExhausted { attempts })
            }
            RetryResult::Cancelled { attempts } => {
                Err(WorkerError::RegistrationExhausted { attempts })
            }
        }
    }

    /// Push diagnostics with retries. Returns whether a heartbeat landed;
    /// running out of attempts is tolerated.
    pub async fn read_diagnostics(&self) -> bool {
        let config = RetryConfig::new("heartbeat")
            .with_budget(HEARTBEAT_RETRIES)
            .with_unit(self.backoff_unit);

        match retry_linear(&config, |_| self.send_heartbeat()).await {
            RetryResult::Success(()) => true,
            RetryResult::Failed { error, attempts } => {
                debug!("Giving up on heartbeat after {} attempts: {}", attempts, error);
                false
            }
            RetryResult::Cancelled { .. } => false,
        }
    }

    /// One heartbeat attempt.
    pub async fn send_heartbeat(&self) -> WorkerResult<()> {
        let diag = diagnostics::collect(&self.diagnostics_path).await?;
        let request = HeartbeatRequest {
            hostname: self.hostname.clone(),
            port: self.port,
            timestamp: Utc::now(),
            status: self.status(),
            workload: u32::try_from(self.job_count()).unwrap_or(u32::MAX),
            cpu: diag.cpu,
            memory: diag.memory,
            disk: diag.disk,
            uptime: diag.uptime,
            version: self.version.clone(),
        };

        let result = self.control_plane.heartbeat(&request).await;
        if result.is_err() {
            metrics::record_control_plane_failure("heartbeat");
        }
        result
    }

    /// Ask which scheduled stream a pushed key belongs to.
    pub async fn request_self_stream(
        &self,
        stream_key: &str,
        cancel: &CancellationToken,
    ) -> WorkerResult<SelfStreamResponse> {
        control_plane::request_self_stream(
            self.control_plane.as_ref(),
            stream_key,
            self.backoff_unit,
            cancel,
        )
        .await
    }

    /// Heartbeat every `interval` until `shutdown` fires.
    pub async fn run_heartbeat_loop(&self, interval: Duration, shutdown: CancellationToken) {
        let mut tracker = FailureTracker::new("heartbeat", HEARTBEAT_LOGGED_FAILURES);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.send_heartbeat().await {
                Ok(()) => tracker.record_success(),
                Err(e) => {
                    if tracker.record_failure() {
                        warn!("Heartbeat failed: {}", e);
                    }
                }
            }
        }
        debug!("Heartbeat loop stopped");
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("draining", &self.is_draining())
            .field("jobs", &self.job_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::{roots, Offline};
    use crate::actions::ActionFactory;
    use cast_media::CommandTemplates;
    use cast_models::JobState;

    fn runner(base: &std::path::Path) -> Runner {
        let config = WorkerConfig {
            hostname: "worker-1".to_string(),
            register_retries: 2,
            retry_backoff: Duration::from_millis(1),
            recording_path: base.join("rec"),
            ..WorkerConfig::default()
        };
        let control_plane: Arc<dyn ControlPlane> = Arc::new(Offline);
        let factory = ActionFactory::new(
            CommandTemplates::builtin(),
            roots(base),
            Arc::clone(&control_plane),
            reqwest::Client::new(),
        );
        Runner::new(&config, 8080, control_plane, factory)
    }

    #[tokio::test]
    async fn test_finished_job_leaves_the_table() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = runner(tmp.path());
        let mut count = runner.subscribe_job_count();

        let id = runner
            .add_job(
                JobContext::new(),
                vec![Action::from_fn(ActionType::Prepare, |ctx, _| async move {
                    Ok(ctx)
                })],
            )
            .unwrap();

        count.wait_for(|n| *n == 0).await.unwrap();
        assert!(runner.find_job(id.as_str()).is_none());
        assert_eq!(runner.status(), WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn test_draining_rejects_new_jobs() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = runner(tmp.path());
        runner.drain();

        let err = runner.add_job(JobContext::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, WorkerError::Draining));
        assert_eq!(runner.status(), WorkerStatus::Draining);
    }

    #[tokio::test]
    async fn test_stream_end_cancels_by_action_id() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = runner(tmp.path());

        // Like a live capture: runs until told to stop, then ends normally.
        let action = Action::from_fn(ActionType::Stream, |ctx, cancel| async move {
            cancel.cancelled().await;
            Ok(ctx)
        });
        runner
            .add_job(JobContext::new().with_action_id("a-9"), vec![action])
            .unwrap();
        let job = runner.find_job("a-9").unwrap();

        // Wait until the capture has started before ending it.
        let mut state = job.subscribe();
        state.wait_for(|s| *s == JobState::Running).await.unwrap();
        while job.actions()[0].handle().is_none() {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            runner
                .cancel_actions("a-9", "stream end", &[ActionType::Stream])
                .unwrap(),
            1
        );
        assert_eq!(job.wait().await, JobState::Succeeded);
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = runner(tmp.path());
        let err = runner
            .cancel_actions("nope", "stream end", &[ActionType::Stream])
            .unwrap_err();
        assert!(matches!(err, WorkerError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_registration_exhaustion_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(runner(tmp.path()));

        let err = runner.register().await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::RegistrationExhausted { attempts: 2 }
        ));
    }
}
