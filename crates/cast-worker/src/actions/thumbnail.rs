use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cast_media::{generate_thumbnail, store_thumbnail, CommandTemplates, ThumbnailOutcome};

use crate::action::ActionHandler;
use crate::context::JobContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// File name of the per-stream thumbnail.
const THUMBNAIL_NAME: &str = "thumb.jpg";

/// Generates the stream's preview image, compositing it with one another
/// version already produced.
pub struct ThumbnailAction {
    templates: Arc<CommandTemplates>,
}

impl ThumbnailAction {
    pub fn new(templates: Arc<CommandTemplates>) -> Self {
        Self { templates }
    }
}

/// The stream-level thumbnail sits next to the per-version directories.
fn stream_thumbnail(version_dir: &Path) -> WorkerResult<PathBuf> {
    version_dir
        .parent()
        .map(|stream_dir| stream_dir.join(THUMBNAIL_NAME))
        .ok_or_else(|| WorkerError::missing("directories"))
}

#[async_trait]
impl ActionHandler for ThumbnailAction {
    async fn run(
        &self,
        ctx: JobContext,
        cancel: CancellationToken,
        log: &JobLogger,
    ) -> WorkerResult<JobContext> {
        let video = match ctx.transcoded_file() {
            Ok(path) => path.to_path_buf(),
            Err(e) => ctx.files()?.first().cloned().ok_or(e)?,
        };
        let dirs = ctx.directories()?;
        let version = ctx.version()?;

        tokio::fs::create_dir_all(&dirs.mass).await?;
        let fresh = dirs.mass.join(format!("thumb-{}.jpg", version));
        let target = stream_thumbnail(&dirs.mass)?;

        generate_thumbnail(&self.templates, &video, &fresh, cancel).await?;
        match store_thumbnail(&fresh, &target).await? {
            ThumbnailOutcome::Stored => {
                log.log_progress(&format!("Stored thumbnail {}", target.display()))
            }
            ThumbnailOutcome::Composited => log.log_progress(&format!(
                "Composited {} thumbnail into {}",
                version,
                target.display()
            )),
        }

        Ok(ctx.with_thumbnail(target))
    }
}
