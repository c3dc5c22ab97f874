use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use cast_media::{
    CommandTemplates, FfmpegCommand, FfmpegRunner, MediaError, SourceKind, TemplateKind,
    TemplateParams,
};

use crate::action::ActionHandler;
use crate::context::JobContext;
use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// Pause between capture passes after the media tool exits early.
pub const STREAM_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Captures a source until its scheduled end.
///
/// Each pass writes `<recording>/<n>.ts` and appends to the live playlist
/// under the segment directory. A pass that exits before the end time is
/// followed by another one after [`STREAM_RETRY_DELAY`]. Cancellation ends
/// the capture normally, with the files recorded so far.
pub struct StreamAction {
    templates: Arc<CommandTemplates>,
    program: String,
    retry_delay: Duration,
}

impl StreamAction {
    pub fn new(templates: Arc<CommandTemplates>) -> Self {
        Self {
            templates,
            program: "ffmpeg".to_string(),
            retry_delay: STREAM_RETRY_DELAY,
        }
    }

    /// Capture with a different executable taking the rendered arguments.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

#[async_trait]
impl ActionHandler for StreamAction {
    async fn run(
        &self,
        ctx: JobContext,
        cancel: CancellationToken,
        log: &JobLogger,
    ) -> WorkerResult<JobContext> {
        let source = ctx.source()?.to_string();
        let end = ctx.end()?;
        let dirs = ctx.directories()?.clone();
        let input_flags = SourceKind::detect(&source).input_flags();

        let mut files: Vec<PathBuf> = Vec::new();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let remaining = (end - Utc::now()).num_seconds();
            if remaining <= 0 {
                break;
            }

            let archive = dirs.recording.join(format!("{}.ts", attempt));
            let params = TemplateParams::new()
                .set_many("input_flags", input_flags.clone())
                .set("duration", remaining.to_string())
                .set("source", source.as_str())
                .set_path("archive", &archive)
                .set_path("segment_pattern", &dirs.segments.join("%05d.ts"))
                .set_path("playlist", &dirs.segments.join("playlist.m3u8"));
            let cmd = FfmpegCommand::from_template(&self.templates, TemplateKind::Stream, &params)?;

            log.log_progress(&format!(
                "Capture pass {} from {}, {}s left",
                attempt, source, remaining
            ));
            let result = FfmpegRunner::new()
                .with_program(self.program.as_str())
                .with_cancel(cancel.clone())
                .run(&cmd)
                .await;
            attempt += 1;

            if archive.exists() {
                files.push(archive);
            }

            match result {
                Ok(()) => {}
                Err(MediaError::Cancelled) => break,
                Err(e @ MediaError::ToolNotFound(_)) => return Err(e.into()),
                Err(e) => log.log_warning(&format!("Capture pass exited: {}", e)),
            }

            if Utc::now() >= end {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.retry_delay) => {}
                _ = cancel.cancelled() => break,
            }
        }

        log.log_progress(&format!(
            "Capture finished after {} pass(es), {} file(s)",
            attempt,
            files.len()
        ));
        Ok(ctx.with_files(files))
    }
}
