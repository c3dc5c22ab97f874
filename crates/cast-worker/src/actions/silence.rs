use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cast_media::{detect_silence, CommandTemplates};

use crate::action::ActionHandler;
use crate::context::JobContext;
use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// Finds skippable silent stretches in the transcoded file.
pub struct SilenceDetectAction {
    templates: Arc<CommandTemplates>,
}

impl SilenceDetectAction {
    pub fn new(templates: Arc<CommandTemplates>) -> Self {
        Self { templates }
    }
}

#[async_trait]
impl ActionHandler for SilenceDetectAction {
    async fn run(
        &self,
        ctx: JobContext,
        cancel: CancellationToken,
        log: &JobLogger,
    ) -> WorkerResult<JobContext> {
        let input = ctx.transcoded_file()?.to_path_buf();

        let silences = detect_silence(&self.templates, &input, cancel).await?;
        log.log_progress(&format!(
            "Found {} silent stretch(es) in {}",
            silences.len(),
            input.display()
        ));

        Ok(ctx.with_silences(silences))
    }
}
