//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use cast_media::CommandTemplates;

use crate::actions::StoragePaths;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Text or JSON log lines
    pub log_format: LogFormat,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Inbound RPC port; 0 picks a free one
    pub port: u16,
    /// Hostname advertised to the control plane
    pub hostname: String,
    /// Control-plane base URL
    pub control_plane_url: String,
    /// Long-term storage root
    pub mass_storage_path: PathBuf,
    /// Live HLS segment root
    pub segment_path: PathBuf,
    /// Raw recording root
    pub recording_path: PathBuf,
    /// Version string reported in heartbeats
    pub version: String,
    /// Optional command template file
    pub templates_path: Option<PathBuf>,
    /// Registration attempts before giving up
    pub register_retries: u32,
    /// Period of the background heartbeat
    pub heartbeat_interval: Duration,
    /// Unit of the linear retry backoff
    pub retry_backoff: Duration,
    /// Base URL self-streams are pulled from
    pub ingest_url: String,
    /// Install the Prometheus recorder
    pub metrics_enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Text,
            log_level: "info".to_string(),
            port: 0,
            hostname: "localhost".to_string(),
            control_plane_url: "http://localhost:50056".to_string(),
            mass_storage_path: PathBuf::from("/srv/cephfs/livestream/rec/TUM-Live"),
            segment_path: PathBuf::from("/srv/sharedMassStorage"),
            recording_path: PathBuf::from("/recordings"),
            version: env!("CARGO_PKG_VERSION").to_string(),
            templates_path: None,
            register_retries: 5,
            heartbeat_interval: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(1000),
            ingest_url: "rtmp://localhost/live".to_string(),
            metrics_enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            log_level: std::env::var("LOG_LEVEL")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.log_level),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            hostname: std::env::var("HOSTNAME")
                .ok()
                .filter(|s| !s.is_empty())
                .or_else(system_hostname)
                .unwrap_or(defaults.hostname),
            control_plane_url: std::env::var("GOCAST_SERVER")
                .unwrap_or(defaults.control_plane_url),
            mass_storage_path: std::env::var("MASS_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.mass_storage_path),
            segment_path: std::env::var("SEGMENT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.segment_path),
            recording_path: std::env::var("RECORDING_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.recording_path),
            version: std::env::var("VERSION").unwrap_or(defaults.version),
            templates_path: std::env::var("CMD_TEMPLATES").ok().map(PathBuf::from),
            register_retries: std::env::var("REGISTER_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.register_retries),
            heartbeat_interval: Duration::from_secs(
                std::env::var("HEARTBEAT_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            retry_backoff: Duration::from_millis(
                std::env::var("RETRY_BACKOFF_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            ingest_url: std::env::var("INGEST_URL").unwrap_or(defaults.ingest_url),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// The three storage roots.
    pub fn storage_paths(&self) -> StoragePaths {
        StoragePaths::new(
            &self.recording_path,
            &self.segment_path,
            &self.mass_storage_path,
        )
    }

    /// Command templates from `CMD_TEMPLATES`, or the built-in set.
    pub fn load_templates(&self) -> CommandTemplates {
        match &self.templates_path {
            Some(path) => CommandTemplates::load(path),
            None => CommandTemplates::builtin(),
        }
    }
}

fn system_hostname() -> Option<String> {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
