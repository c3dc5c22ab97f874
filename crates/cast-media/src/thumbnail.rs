//! Thumbnail generation and compositing.

use std::path::{Path, PathBuf};

use image::{imageops, DynamicImage, GenericImageView, RgbImage};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{move_file, remove_if_exists};
use crate::templates::{CommandTemplates, TemplateKind, TemplateParams};

/// What [`store_thumbnail`] did with a freshly generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    /// First thumbnail for the stream, moved into place.
    Stored,
    /// Combined with the thumbnail already in place.
    Composited,
}

/// Grab a preview frame from `video_path` into `output_path`.
pub async fn generate_thumbnail(
    templates: &CommandTemplates,
    video_path: &Path,
    output_path: &Path,
    cancel: CancellationToken,
) -> MediaResult<()> {
    let params = TemplateParams::new()
        .set_path("input", video_path)
        .set_path("output", output_path);
    let cmd = FfmpegCommand::from_template(templates, TemplateKind::Thumbnail, &params)?;

    FfmpegRunner::new().with_cancel(cancel).run(&cmd).await?;

    if !output_path.exists() {
        return Err(MediaError::FileNotFound(output_path.to_path_buf()));
    }
    Ok(())
}

/// Put `fresh` at `target`.
///
/// When `target` does not exist yet, `fresh` is moved there. Otherwise the
/// two are laid side by side into a new image at `target` and the
/// originals are removed.
pub async fn store_thumbnail(fresh: &Path, target: &Path) -> MediaResult<ThumbnailOutcome> {
    if !fresh.exists() {
        return Err(MediaError::FileNotFound(fresh.to_path_buf()));
    }

    if !target.exists() {
        move_file(fresh, target).await?;
        return Ok(ThumbnailOutcome::Stored);
    }

    let staging = staging_path(target);
    let (existing, added, out) = (target.to_path_buf(), fresh.to_path_buf(), staging.clone());
    tokio::task::spawn_blocking(move || composite(&existing, &added, &out))
        .await
        .map_err(|e| MediaError::internal(format!("composite task failed: {}", e)))??;

    remove_if_exists(fresh).await?;
    remove_if_exists(target).await?;
    move_file(&staging, target).await?;

    debug!(target = %target.display(), "Composited thumbnail");
    Ok(ThumbnailOutcome::Composited)
}

fn staging_path(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "thumb".to_string());
    let ext = target
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "jpg".to_string());
    target.with_file_name(format!("{}-composite.{}", stem, ext))
}

/// Lay `left` and `right` next to each other, scaling `right` to the
/// height of `left`.
fn composite(left: &Path, right: &Path, out: &Path) -> MediaResult<()> {
    let left = image::open(left)?;
    let right = image::open(right)?;
    let right = match_height(right, left.height());

    let (lw, lh) = left.dimensions();
    let (rw, rh) = right.dimensions();
    let mut canvas = RgbImage::new(lw + rw, lh.max(rh));
    imageops::replace(&mut canvas, &left.to_rgb8(), 0, 0);
    imageops::replace(&mut canvas, &right.to_rgb8(), i64::from(lw), 0);

    canvas.save(out)?;
    Ok(())
}

fn match_height(img: DynamicImage, height: u32) -> DynamicImage {
    if img.height() == height || img.height() == 0 {
        return img;
    }
    let width = (u64::from(img.width()) * u64::from(height) / u64::from(img.height())).max(1) as u32;
    img.resize_exact(width, height, imageops::FilterType::Triangle)
}
