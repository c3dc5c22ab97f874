//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Missing context value: {key}")]
    MissingContextValue { key: &'static str },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Wrong hostname: request is for {got}, this worker is {expected}")]
    WrongHostname { expected: String, got: String },

    #[error("Worker is draining")]
    Draining,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Control plane error: {0}")]
    ControlPlane(String),

    #[error("Registration failed after {attempts} attempts")]
    RegistrationExhausted { attempts: u32 },

    #[error("Diagnostics unavailable: {0}")]
    DiagnosticsUnavailable(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] cast_media::MediaError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn missing(key: &'static str) -> Self {
        Self::MissingContextValue { key }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    pub fn control_plane(msg: impl Into<String>) -> Self {
        Self::ControlPlane(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if the error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        match self {
            WorkerError::Cancelled(_) => true,
            WorkerError::Media(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Check if the error broke an action's input contract.
    pub fn is_missing_context(&self) -> bool {
        matches!(self, WorkerError::MissingContextValue { .. })
    }
}
