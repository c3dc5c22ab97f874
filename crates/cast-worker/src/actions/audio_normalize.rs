use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cast_media::fs_utils::{move_file, remove_if_exists};
use cast_media::{analyze_loudness, apply_loudness, CommandTemplates};

use crate::action::ActionHandler;
use crate::context::JobContext;
use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// Two-pass loudness normalization of the transcoded file, in place.
///
/// A failed analysis pass is only a warning: the file is left as it is and
/// the job carries on.
pub struct AudioNormalizeAction {
    templates: Arc<CommandTemplates>,
}

impl AudioNormalizeAction {
    pub fn new(templates: Arc<CommandTemplates>) -> Self {
        Self { templates }
    }
}

#[async_trait]
impl ActionHandler for AudioNormalizeAction {
    async fn run(
        &self,
        ctx: JobContext,
        cancel: CancellationToken,
        log: &JobLogger,
    ) -> WorkerResult<JobContext> {
        let input = ctx.transcoded_file()?.to_path_buf();

        let measurement = match analyze_loudness(&self.templates, &input, cancel.clone()).await {
            Ok(m) => m,
            Err(e) if e.is_cancelled() => return Err(e.into()),
            Err(e) => {
                log.log_warning(&format!(
                    "Loudness analysis failed, skipping normalization: {}",
                    e
                ));
                return Ok(ctx);
            }
        };
        log.log_progress(&format!(
            "Measured {} LUFS, offset {}",
            measurement.input_i, measurement.target_offset
        ));

        let normalized = input.with_extension("normalized.mp4");
        if let Err(e) =
            apply_loudness(&self.templates, &input, &normalized, &measurement, cancel).await
        {
            remove_if_exists(&normalized).await?;
            return Err(e.into());
        }
        move_file(&normalized, &input).await?;

        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cast_models::JobId;

    #[tokio::test]
    async fn test_failed_analysis_is_not_a_job_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("COMB.mp4");
        tokio::fs::write(&input, b"original").await.unwrap();

        // No analysis template: pass one fails before spawning anything.
        let action = AudioNormalizeAction::new(Arc::new(CommandTemplates::empty()));
        let out = action
            .run(
                JobContext::new().with_transcoded_file(input.clone()),
                CancellationToken::new(),
                &JobLogger::new(&JobId::new()),
            )
            .await
            .unwrap();

        assert_eq!(out.transcoded_file().unwrap(), input.as_path());
        assert_eq!(tokio::fs::read(&input).await.unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_cancelled_analysis_propagates() {
        let token = CancellationToken::new();
        token.cancel();
        let action = AudioNormalizeAction::new(Arc::new(CommandTemplates::builtin()));

        let err = action
            .run(
                JobContext::new().with_transcoded_file("/r/COMB.mp4".into()),
                token,
                &JobLogger::new(&JobId::new()),
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_requires_transcoded_file() {
        let action = AudioNormalizeAction::new(Arc::new(CommandTemplates::builtin()));
        let err = action
            .run(
                JobContext::new(),
                CancellationToken::new(),
                &JobLogger::new(&JobId::new()),
            )
            .await
            .unwrap_err();
        assert!(err.is_missing_context());
    }
}
