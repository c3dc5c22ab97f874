//! Shared fixtures for the worker integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use cast_media::CommandTemplates;
use cast_models::{
    HeartbeatRequest, RegisterRequest, SelfStreamRequest, SelfStreamResponse, StreamVersion,
};
use cast_worker::{
    ActionFactory, ControlPlane, Runner, StoragePaths, WorkerConfig, WorkerError, WorkerResult,
};

pub const HOSTNAME: &str = "lecture-hall-worker";

/// Control plane that fails the first `register_failures` registrations.
#[derive(Default)]
pub struct ScriptedControlPlane {
    pub register_failures: u32,
    pub register_calls: AtomicU32,
    pub heartbeat_calls: AtomicU32,
    pub self_stream_calls: AtomicU32,
}

impl ScriptedControlPlane {
    pub fn failing_registrations(n: u32) -> Self {
        Self {
            register_failures: n,
            ..Self::default()
        }
    }

    pub fn registrations(&self) -> u32 {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn heartbeats(&self) -> u32 {
        self.heartbeat_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ControlPlane for ScriptedControlPlane {
    async fn register(&self, _: &RegisterRequest) -> WorkerResult<()> {
        let call = self.register_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.register_failures {
            Err(WorkerError::control_plane("connection refused"))
        } else {
            Ok(())
        }
    }

    async fn heartbeat(&self, _: &HeartbeatRequest) -> WorkerResult<()> {
        self.heartbeat_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn request_self_stream(
        &self,
        _: &SelfStreamRequest,
    ) -> WorkerResult<SelfStreamResponse> {
        self.self_stream_calls.fetch_add(1, Ordering::SeqCst);
        // Already over, so the capture that follows ends at once.
        Ok(SelfStreamResponse {
            stream: 77,
            course: 5,
            version: StreamVersion::Comb,
            end: Utc::now() - ChronoDuration::minutes(1),
            upload_vod: false,
        })
    }
}

pub fn config(base: &Path, register_retries: u32) -> WorkerConfig {
    WorkerConfig {
        hostname: HOSTNAME.to_string(),
        register_retries,
        retry_backoff: Duration::from_millis(10),
        recording_path: base.join("rec"),
        segment_path: base.join("seg"),
        mass_storage_path: base.join("mass"),
        metrics_enabled: false,
        ..WorkerConfig::default()
    }
}

pub fn runner(
    base: &Path,
    register_retries: u32,
    control_plane: Arc<ScriptedControlPlane>,
) -> Arc<Runner> {
    let config = config(base, register_retries);
    let control_plane: Arc<dyn ControlPlane> = control_plane;
    let factory = ActionFactory::new(
        CommandTemplates::builtin(),
        StoragePaths::new(
            &config.recording_path,
            &config.segment_path,
            &config.mass_storage_path,
        ),
        Arc::clone(&control_plane),
        reqwest::Client::new(),
    )
    .with_backoff_unit(config.retry_backoff)
    .with_stream_retry_delay(Duration::from_millis(10));
    Arc::new(Runner::new(&config, 8085, control_plane, factory))
}
