//! Tracing setup and structured job logging.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cast_models::{JobId, StreamVersion};

use crate::config::LogFormat;
use crate::context::JobContext;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_tracing(format: LogFormat, level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(env_filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_ansi(true)
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false),
                )
                .with(env_filter)
                .init();
        }
    }
}

/// Job logger carrying the stream a job works on.
///
/// Every line carries `job_id`, and `stream`/`course`/`version` when the
/// initiating request supplied them.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    stream: Option<String>,
    course: Option<String>,
    version: Option<StreamVersion>,
}

impl JobLogger {
    pub fn new(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.to_string(),
            stream: None,
            course: None,
            version: None,
        }
    }

    /// Logger enriched with whatever stream fields `ctx` already holds.
    pub fn for_context(job_id: &JobId, ctx: &JobContext) -> Self {
        Self {
            job_id: job_id.to_string(),
            stream: ctx.stream().ok().map(str::to_string),
            course: ctx.course().ok().map(str::to_string),
            version: ctx.version().ok(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            stream = self.stream.as_deref(),
            course = self.course.as_deref(),
            version = self.version.map(|v| v.as_str()),
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            stream = self.stream.as_deref(),
            course = self.course.as_deref(),
            version = self.version.map(|v| v.as_str()),
            "{}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            stream = self.stream.as_deref(),
            course = self.course.as_deref(),
            version = self.version.map(|v| v.as_str()),
            "{}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            stream = self.stream.as_deref(),
            course = self.course.as_deref(),
            version = self.version.map(|v| v.as_str()),
            "Job error: {}", message
        );
    }

    /// Cancellation is an expected outcome and logs at info.
    pub fn log_cancelled(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            stream = self.stream.as_deref(),
            course = self.course.as_deref(),
            "Cancelled: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            stream = self.stream.as_deref(),
            course = self.course.as_deref(),
            version = self.version.map(|v| v.as_str()),
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn stream(&self) -> Option<&str> {
        self.stream.as_deref()
    }

    pub fn course(&self) -> Option<&str> {
        self.course.as_deref()
    }

    pub fn version(&self) -> Option<StreamVersion> {
        self.version
    }

    /// Span used to instrument the job task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            stream = self.stream.as_deref(),
            course = self.course.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_without_stream_fields() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id);

        assert_eq!(logger.job_id(), job_id.to_string());
        assert!(logger.stream().is_none());
        assert!(logger.version().is_none());
    }

    #[test]
    fn test_job_logger_picks_up_context_fields() {
        let job_id = JobId::from_string("job-1");
        let ctx = JobContext::new()
            .with_stream("42")
            .with_course("7")
            .with_version(StreamVersion::Cam);

        let logger = JobLogger::for_context(&job_id, &ctx);

        assert_eq!(logger.job_id(), "job-1");
        assert_eq!(logger.stream(), Some("42"));
        assert_eq!(logger.course(), Some("7"));
        assert_eq!(logger.version(), Some(StreamVersion::Cam));
    }
}
