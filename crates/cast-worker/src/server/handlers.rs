//! Inbound RPC handlers.
//!
//! Every job-starting handler replies as soon as the job is registered;
//! the pipeline itself runs in the background.

use std::path::PathBuf;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use url::Url;

use cast_models::{
    Ack, ActionType, PublishRequest, StreamEndRequest, StreamRequest, StreamResponse,
    TranscodingRequest, TranscodingResponse,
};

use crate::context::JobContext;
use crate::error::WorkerError;

use super::error::{RpcError, RpcResult};
use super::AppState;

/// Live capture of a scheduled stream.
pub const STREAM_PIPELINE: [ActionType; 2] = [ActionType::Prepare, ActionType::Stream];

/// Capture of a lecturer-pushed stream.
pub const SELF_STREAM_PIPELINE: [ActionType; 3] =
    [ActionType::SelfStream, ActionType::Prepare, ActionType::Stream];

const POST_PROCESSING: [ActionType; 4] = [
    ActionType::Transcode,
    ActionType::AudioNormalize,
    ActionType::Thumbnail,
    ActionType::SilenceDetect,
];

/// Transcoding pipeline for a recording at `data_url`. Remote recordings are
/// fetched first.
pub fn transcoding_pipeline(data_url: &str) -> Vec<ActionType> {
    let mut kinds = Vec::with_capacity(POST_PROCESSING.len() + 1);
    if is_remote(data_url) {
        kinds.push(ActionType::Upload);
    }
    kinds.extend(POST_PROCESSING);
    kinds
}

fn is_remote(data_url: &str) -> bool {
    Url::parse(data_url)
        .map(|u| u.scheme() == "http" || u.scheme() == "https")
        .unwrap_or(false)
}

pub async fn request_stream(
    State(state): State<AppState>,
    Json(req): Json<StreamRequest>,
) -> RpcResult<Json<StreamResponse>> {
    let runner = &state.runner;
    let ctx = JobContext::new()
        .with_stream(req.stream.to_string())
        .with_course(req.course.to_string())
        .with_version(req.version)
        .with_source(req.source)
        .with_end(req.end)
        .with_action_id(req.action_id.clone())
        .with_hostname(runner.hostname());

    let job_id = runner.add_job(ctx, runner.pipeline(&STREAM_PIPELINE))?;
    info!(
        "Stream {} ({}) of course {} accepted as job {}",
        req.stream, req.version, req.course, job_id
    );

    let action_id = if req.action_id.is_empty() {
        job_id.to_string()
    } else {
        req.action_id
    };
    Ok(Json(StreamResponse { action_id }))
}

pub async fn request_transcoding(
    State(state): State<AppState>,
    Json(req): Json<TranscodingRequest>,
) -> RpcResult<Json<TranscodingResponse>> {
    let runner = &state.runner;
    if req.runner_id != runner.hostname() {
        return Err(WorkerError::WrongHostname {
            expected: runner.hostname().to_string(),
            got: req.runner_id,
        }
        .into());
    }

    let directories = runner.factory().paths().for_stream(
        &req.course_name,
        &req.stream_name,
        req.source_type,
    );
    let kinds = transcoding_pipeline(&req.data_url);
    let mut ctx = JobContext::new()
        .with_stream(req.stream_name.clone())
        .with_course(req.course_name.clone())
        .with_version(req.source_type)
        .with_source(req.data_url.clone())
        .with_action_id(req.action_id.clone())
        .with_hostname(runner.hostname())
        .with_directories(directories);
    if !is_remote(&req.data_url) {
        ctx = ctx.with_files(vec![PathBuf::from(&req.data_url)]);
    }

    let job_id = runner.add_job(ctx, runner.pipeline(&kinds))?;
    info!(
        "Transcoding of {} for stream {} accepted as job {}",
        req.data_url, req.stream_name, job_id
    );

    Ok(Json(TranscodingResponse {
        action_id: req.action_id,
        transcoding_id: job_id.to_string(),
    }))
}

pub async fn request_stream_end(
    State(state): State<AppState>,
    Json(req): Json<StreamEndRequest>,
) -> RpcResult<Json<Ack>> {
    let canceled = state.runner.cancel_actions(
        &req.action_id,
        "stream end requested",
        &[ActionType::Stream],
    )?;
    info!("Stream end for {}: {} action(s) canceled", req.action_id, canceled);
    Ok(Json(Ack::ok()))
}

pub async fn ingest_publish(
    State(state): State<AppState>,
    Json(req): Json<PublishRequest>,
) -> RpcResult<Json<StreamResponse>> {
    if req.stream_key.trim().is_empty() {
        return Err(RpcError::bad_request("stream_key is empty"));
    }

    let runner = &state.runner;
    let ctx = JobContext::new()
        .with_stream_key(req.stream_key)
        .with_hostname(runner.hostname());
    let job_id = runner.add_job(ctx, runner.pipeline(&SELF_STREAM_PIPELINE))?;
    info!("Self-stream accepted as job {}", job_id);

    Ok(Json(StreamResponse {
        action_id: job_id.to_string(),
    }))
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub hostname: String,
    pub draining: bool,
    pub jobs: usize,
    pub timestamp: String,
}

/// Liveness probe.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let runner = &state.runner;
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: runner.version().to_string(),
        hostname: runner.hostname().to_string(),
        draining: runner.is_draining(),
        jobs: runner.job_count(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
