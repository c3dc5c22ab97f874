//! Control-channel message bodies.
//!
//! Every call is a JSON `POST`. The worker serves the `worker` routes and
//! calls the `control_plane` routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stream::StreamVersion;

/// Route paths shared by both sides of the channel.
pub mod routes {
    /// Routes served by the worker.
    pub mod worker {
        pub const REQUEST_STREAM: &str = "/rpc/request-stream";
        pub const REQUEST_TRANSCODING: &str = "/rpc/request-transcoding";
        pub const REQUEST_STREAM_END: &str = "/rpc/request-stream-end";
        pub const INGEST_PUBLISH: &str = "/ingest/publish";
        pub const HEALTH: &str = "/health";
        pub const METRICS: &str = "/metrics";
    }

    /// Routes served by the control plane.
    pub mod control_plane {
        pub const REGISTER: &str = "/runner/register";
        pub const HEARTBEAT: &str = "/runner/heartbeat";
        pub const SELF_STREAM: &str = "/runner/self-stream";
    }
}

/// Generic acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Error body returned with any non-2xx reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Announces a worker to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub hostname: String,
    pub port: u16,
}

/// Coarse worker status reported with every heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// No jobs in flight
    Idle,
    /// At least one job in flight
    Working,
    /// Refusing new jobs until in-flight ones finish
    Draining,
}

/// Liveness and load report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub hostname: String,
    pub port: u16,
    pub timestamp: DateTime<Utc>,
    pub status: WorkerStatus,
    /// Number of jobs in flight
    pub workload: u32,
    pub cpu: String,
    pub memory: String,
    pub disk: String,
    pub uptime: String,
    pub version: String,
}

/// Start capturing a scheduled stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequest {
    pub stream: u64,
    pub course: u64,
    pub version: StreamVersion,
    /// RTSP/RTMP URL or local file path
    pub source: String,
    pub end: DateTime<Utc>,
    pub action_id: String,
}

/// Reply to any request that starts a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamResponse {
    pub action_id: String,
}

/// Transcode an existing recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodingRequest {
    pub stream_name: String,
    pub course_name: String,
    pub source_type: StreamVersion,
    pub data_url: String,
    /// Hostname of the worker this request is meant for
    pub runner_id: String,
    pub action_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodingResponse {
    pub action_id: String,
    pub transcoding_id: String,
}

/// Stop the live capture started under `action_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEndRequest {
    pub action_id: String,
}

/// Sent by a local ingest when a lecturer starts pushing with `stream_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub stream_key: String,
}

/// Ask the control plane which stream a pushed key belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfStreamRequest {
    pub stream_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfStreamResponse {
    pub stream: u64,
    pub course: u64,
    #[serde(default)]
    pub version: StreamVersion,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub upload_vod: bool,
}
