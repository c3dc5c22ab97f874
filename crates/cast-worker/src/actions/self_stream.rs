use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::action::ActionHandler;
use crate::context::JobContext;
use crate::control_plane::{request_self_stream, ControlPlane};
use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// Resolves a pushed stream key into the scheduled stream it belongs to.
pub struct SelfStreamAction {
    control_plane: Arc<dyn ControlPlane>,
    ingest_url: String,
    backoff_unit: Duration,
}

impl SelfStreamAction {
    pub fn new(control_plane: Arc<dyn ControlPlane>, ingest_url: String, backoff_unit: Duration) -> Self {
        Self {
            control_plane,
            ingest_url,
            backoff_unit,
        }
    }
}

#[async_trait]
impl ActionHandler for SelfStreamAction {
    async fn run(
        &self,
        ctx: JobContext,
        cancel: CancellationToken,
        log: &JobLogger,
    ) -> WorkerResult<JobContext> {
        let key = ctx.stream_key()?.to_string();

        let stream = request_self_stream(
            self.control_plane.as_ref(),
            &key,
            self.backoff_unit,
            &cancel,
        )
        .await?;
        log.log_progress(&format!(
            "Stream key resolved to course {} stream {} ({}), vod upload {}",
            stream.course, stream.stream, stream.version, stream.upload_vod
        ));

        let source = format!("{}/{}", self.ingest_url.trim_end_matches('/'), key);
        Ok(ctx
            .with_stream(stream.stream.to_string())
            .with_course(stream.course.to_string())
            .with_version(stream.version)
            .with_end(stream.end)
            .with_source(source))
    }
}
