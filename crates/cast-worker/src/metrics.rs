//! Prometheus metrics for the worker.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use cast_models::{ActionType, JobState};

/// Install the Prometheus recorder and return a handle for `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_ACTIVE: &str = "cast_jobs_active";
    pub const JOBS_TOTAL: &str = "cast_jobs_total";
    pub const ACTIONS_TOTAL: &str = "cast_actions_total";
    pub const ACTION_DURATION_SECONDS: &str = "cast_action_duration_seconds";
    pub const CONTROL_PLANE_FAILURES_TOTAL: &str = "cast_control_plane_failures_total";
}

pub fn set_jobs_active(count: usize) {
    gauge!(names::JOBS_ACTIVE).set(count as f64);
}

/// Record a finished job.
pub fn record_job(outcome: JobState) {
    let labels = [("outcome", outcome.as_str().to_string())];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
}

/// Record a finished action and how long it ran.
pub fn record_action(action: ActionType, outcome: &str, duration_secs: f64) {
    let labels = [
        ("action", action.as_str().to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::ACTIONS_TOTAL, &labels).increment(1);

    let labels = [("action", action.as_str().to_string())];
    histogram!(names::ACTION_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a failed control-plane call (`register`, `heartbeat`, `self_stream`).
pub fn record_control_plane_failure(call: &str) {
    let labels = [("call", call.to_string())];
    counter!(names::CONTROL_PLANE_FAILURES_TOTAL, &labels).increment(1);
}
