use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use cast_media::fs_utils::{move_file, remove_if_exists};

use crate::action::ActionHandler;
use crate::context::JobContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Brings an uploaded recording into the recording directory.
///
/// HTTP(S) sources are streamed to disk, anything else is treated as a
/// local path and moved. The result is appended to the file list.
pub struct UploadAction {
    http: reqwest::Client,
}

impl UploadAction {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn download(
        &self,
        url: &Url,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> WorkerResult<u64> {
        let response = tokio::select! {
            r = self.http.get(url.clone()).send() => r?,
            _ = cancel.cancelled() => return Err(WorkerError::cancelled("upload")),
        };
        let response = response
            .error_for_status()
            .map_err(|e| WorkerError::upload_failed(e.to_string()))?;

        let partial = dest.with_extension("partial");
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut body = response.bytes_stream();
        let mut written = 0u64;

        loop {
            let chunk = tokio::select! {
                chunk = body.next() => chunk,
                _ = cancel.cancelled() => {
                    drop(file);
                    remove_if_exists(&partial).await?;
                    return Err(WorkerError::cancelled("upload"));
                }
            };
            match chunk {
                Some(Ok(bytes)) => {
                    file.write_all(&bytes).await?;
                    written += bytes.len() as u64;
                }
                Some(Err(e)) => {
                    drop(file);
                    remove_if_exists(&partial).await?;
                    return Err(WorkerError::upload_failed(e.to_string()));
                }
                None => break,
            }
        }

        file.flush().await?;
        drop(file);
        tokio::fs::rename(&partial, dest).await?;
        Ok(written)
    }
}

/// Extension of the source, defaulting to `mp4`.
fn extension(source: &str) -> String {
    let path = match Url::parse(source) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url.path().to_string(),
        _ => source.to_string(),
    };
    Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or("mp4")
        .to_lowercase()
}

fn remote_url(source: &str) -> Option<Url> {
    Url::parse(source)
        .ok()
        .filter(|u| u.scheme() == "http" || u.scheme() == "https")
}

#[async_trait]
impl ActionHandler for UploadAction {
    async fn run(
        &self,
        ctx: JobContext,
        cancel: CancellationToken,
        log: &JobLogger,
    ) -> WorkerResult<JobContext> {
        let source = ctx.source()?.to_string();
        let dirs = ctx.directories()?;

        tokio::fs::create_dir_all(&dirs.recording).await?;
        let dest: PathBuf = dirs.recording.join(format!("upload.{}", extension(&source)));

        match remote_url(&source) {
            Some(url) => {
                let bytes = self.download(&url, &dest, &cancel).await?;
                log.log_progress(&format!("Downloaded {} bytes from {}", bytes, url));
            }
            None => {
                if cancel.is_cancelled() {
                    return Err(WorkerError::cancelled("upload"));
                }
                let local = Path::new(&source);
                if !local.exists() {
                    return Err(WorkerError::upload_failed(format!("{} does not exist", source)));
                }
                move_file(local, &dest).await?;
                log.log_progress(&format!("Moved {} into place", source));
            }
        }

        Ok(ctx.with_files(vec![dest]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Directories;
    use cast_models::JobId;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx(base: &Path, source: &str) -> JobContext {
        JobContext::new()
            .with_source(source)
            .with_directories(Directories {
                recording: base.join("rec"),
                segments: base.join("seg"),
                mass: base.join("mass"),
            })
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("https://host/files/lecture.MKV?token=1"), "mkv");
        assert_eq!(extension("/srv/in/recording.mov"), "mov");
        assert_eq!(extension("https://host/download"), "mp4");
    }

    #[tokio::test]
    async fn test_moves_local_file() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("incoming.mp4");
        tokio::fs::write(&src, b"video").await.unwrap();

        let action = UploadAction::new(reqwest::Client::new());
        let out = action
            .run(
                ctx(tmp.path(), src.to_str().unwrap()),
                CancellationToken::new(),
                &JobLogger::new(&JobId::new()),
            )
            .await
            .unwrap();

        let files = out.files().unwrap();
        assert_eq!(files, &[tmp.path().join("rec/upload.mp4")]);
        assert!(!src.exists());
    }

    #[tokio::test]
    async fn test_downloads_remote_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vod/lecture.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let source = format!("{}/vod/lecture.mp4", server.uri());
        let action = UploadAction::new(reqwest::Client::new());
        let out = action
            .run(
                ctx(tmp.path(), &source),
                CancellationToken::new(),
                &JobLogger::new(&JobId::new()),
            )
            .await
            .unwrap();

        let dest = &out.files().unwrap()[0];
        assert_eq!(tokio::fs::read(dest).await.unwrap().len(), 4096);
        assert!(!dest.with_extension("partial").exists());
    }

    #[tokio::test]
    async fn test_remote_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let action = UploadAction::new(reqwest::Client::new());
        let err = action
            .run(
                ctx(tmp.path(), &format!("{}/missing.mp4", server.uri())),
                CancellationToken::new(),
                &JobLogger::new(&JobId::new()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::UploadFailed(_)));
    }

    #[tokio::test]
    async fn test_cancelled_upload_leaves_source_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("incoming.mp4");
        tokio::fs::write(&src, b"video").await.unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let err = UploadAction::new(reqwest::Client::new())
            .run(
                ctx(tmp.path(), src.to_str().unwrap()),
                token,
                &JobLogger::new(&JobId::new()),
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(src.exists());
    }
}
