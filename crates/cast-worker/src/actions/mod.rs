//! The concrete pipeline actions and the factory that wires them.

mod audio_normalize;
mod prepare;
mod self_stream;
mod silence;
mod stream;
mod thumbnail;
mod transcode;
mod upload;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cast_media::CommandTemplates;
use cast_models::{ActionType, StreamVersion};

use crate::action::Action;
use crate::context::Directories;
use crate::control_plane::ControlPlane;

pub use audio_normalize::AudioNormalizeAction;
pub use prepare::PrepareAction;
pub use self_stream::SelfStreamAction;
pub use silence::SilenceDetectAction;
pub use stream::{StreamAction, STREAM_RETRY_DELAY};
pub use thumbnail::ThumbnailAction;
pub use transcode::TranscodeAction;
pub use upload::UploadAction;

/// The three storage roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub recording: PathBuf,
    pub segments: PathBuf,
    pub mass: PathBuf,
}

impl StoragePaths {
    pub fn new(recording: &Path, segments: &Path, mass: &Path) -> Self {
        Self {
            recording: recording.to_path_buf(),
            segments: segments.to_path_buf(),
            mass: mass.to_path_buf(),
        }
    }

    /// `<root>/<course>/<stream>/<version>` under each root.
    pub fn for_stream(&self, course: &str, stream: &str, version: StreamVersion) -> Directories {
        let leaf = |root: &Path| root.join(course).join(stream).join(version.as_str());
        Directories {
            recording: leaf(&self.recording),
            segments: leaf(&self.segments),
            mass: leaf(&self.mass),
        }
    }
}

/// Builds actions that share the worker's templates, storage roots and
/// control-plane client.
#[derive(Clone)]
pub struct ActionFactory {
    templates: Arc<CommandTemplates>,
    paths: StoragePaths,
    control_plane: Arc<dyn ControlPlane>,
    http: reqwest::Client,
    ingest_url: String,
    backoff_unit: Duration,
    capture_program: String,
    stream_retry_delay: Duration,
}

impl ActionFactory {
    pub fn new(
        templates: CommandTemplates,
        paths: StoragePaths,
        control_plane: Arc<dyn ControlPlane>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            templates: Arc::new(templates),
            paths,
            control_plane,
            http,
            ingest_url: "rtmp://localhost/live".to_string(),
            backoff_unit: Duration::from_secs(1),
            capture_program: "ffmpeg".to_string(),
            stream_retry_delay: STREAM_RETRY_DELAY,
        }
    }

    pub fn with_ingest_url(mut self, ingest_url: impl Into<String>) -> Self {
        self.ingest_url = ingest_url.into();
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Executable used for live capture.
    pub fn with_capture_program(mut self, program: impl Into<String>) -> Self {
        self.capture_program = program.into();
        self
    }

    pub fn with_stream_retry_delay(mut self, delay: Duration) -> Self {
        self.stream_retry_delay = delay;
        self
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn build(&self, kind: ActionType) -> Action {
        match kind {
            ActionType::Prepare => Action::new(kind, PrepareAction::new(self.paths.clone())),
            ActionType::Stream => Action::new(
                kind,
                StreamAction::new(Arc::clone(&self.templates))
                    .with_program(self.capture_program.as_str())
                    .with_retry_delay(self.stream_retry_delay),
            ),
            ActionType::Transcode => {
                Action::new(kind, TranscodeAction::new(Arc::clone(&self.templates)))
            }
            ActionType::Upload => Action::new(kind, UploadAction::new(self.http.clone())),
            ActionType::Thumbnail => {
                Action::new(kind, ThumbnailAction::new(Arc::clone(&self.templates)))
            }
            ActionType::SelfStream => Action::new(
                kind,
                SelfStreamAction::new(
                    Arc::clone(&self.control_plane),
                    self.ingest_url.clone(),
                    self.backoff_unit,
                ),
            ),
            ActionType::SilenceDetect => {
                Action::new(kind, SilenceDetectAction::new(Arc::clone(&self.templates)))
            }
            ActionType::AudioNormalize => {
                Action::new(kind, AudioNormalizeAction::new(Arc::clone(&self.templates)))
            }
        }
    }

    /// Build one action per entry, in order.
    pub fn pipeline(&self, kinds: &[ActionType]) -> Vec<Action> {
        kinds.iter().map(|&kind| self.build(kind)).collect()
    }
}

impl std::fmt::Debug for ActionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionFactory")
            .field("paths", &self.paths)
            .field("ingest_url", &self.ingest_url)
            .field("capture_program", &self.capture_program)
            .finish_non_exhaustive()
    }
}
