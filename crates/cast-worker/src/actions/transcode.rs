use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cast_media::{CommandTemplates, FfmpegCommand, FfmpegRunner, TemplateKind, TemplateParams};

use crate::action::ActionHandler;
use crate::context::JobContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Produces `<mass>/<version>.mp4` from the captured or uploaded files.
pub struct TranscodeAction {
    templates: Arc<CommandTemplates>,
}

impl TranscodeAction {
    pub fn new(templates: Arc<CommandTemplates>) -> Self {
        Self { templates }
    }
}

/// A single input as-is, several joined with the concat protocol.
fn concat_input(files: &[PathBuf]) -> String {
    match files {
        [single] => single.to_string_lossy().into_owned(),
        many => {
            let joined: Vec<String> = many
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            format!("concat:{}", joined.join("|"))
        }
    }
}

fn output_path(mass: &Path, version: &str) -> PathBuf {
    mass.join(format!("{}.mp4", version))
}

#[async_trait]
impl ActionHandler for TranscodeAction {
    async fn run(
        &self,
        ctx: JobContext,
        cancel: CancellationToken,
        log: &JobLogger,
    ) -> WorkerResult<JobContext> {
        let files = ctx.files()?;
        // Nothing captured means nothing to transcode.
        if files.is_empty() {
            return Err(WorkerError::missing("files"));
        }
        let dirs = ctx.directories()?;
        let version = ctx.version()?;

        tokio::fs::create_dir_all(&dirs.mass).await?;
        let output = output_path(&dirs.mass, version.as_str());
        let params = TemplateParams::new()
            .set("input", concat_input(files))
            .set_path("output", &output);
        let cmd = FfmpegCommand::from_template(&self.templates, TemplateKind::Transcode, &params)?;

        log.log_progress(&format!(
            "Transcoding {} file(s) into {}",
            files.len(),
            output.display()
        ));
        FfmpegRunner::new().with_cancel(cancel).run(&cmd).await?;

        Ok(ctx.with_transcoded_file(output))
    }
}
