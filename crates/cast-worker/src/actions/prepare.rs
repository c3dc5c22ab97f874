use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::action::ActionHandler;
use crate::actions::StoragePaths;
use crate::context::JobContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Creates the recording, segment and mass-storage directories for a stream.
#[derive(Debug, Clone)]
pub struct PrepareAction {
    paths: StoragePaths,
}

impl PrepareAction {
    pub fn new(paths: StoragePaths) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl ActionHandler for PrepareAction {
    async fn run(
        &self,
        ctx: JobContext,
        cancel: CancellationToken,
        log: &JobLogger,
    ) -> WorkerResult<JobContext> {
        let dirs = self
            .paths
            .for_stream(ctx.course()?, ctx.stream()?, ctx.version()?);

        for dir in dirs.all() {
            if cancel.is_cancelled() {
                return Err(WorkerError::cancelled("prepare"));
            }
            // create_dir_all succeeds on existing directories.
            tokio::fs::create_dir_all(dir).await?;
        }
        log.log_progress(&format!("Prepared {}", dirs.recording.display()));

        Ok(ctx.with_directories(dirs))
    }
}
