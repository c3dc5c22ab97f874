//! FFmpeg CLI orchestration for lecture capture.
//!
//! This crate provides:
//! - Command templates loaded from a file, rendered with runtime parameters
//! - A subprocess runner bound to a cancellation token
//! - Source-type detection for capture inputs
//! - Silence detection and interval merging
//! - Thumbnail generation and compositing
//! - Two-pass loudness normalization

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod loudness;
pub mod silence;
pub mod source;
pub mod templates;
pub mod thumbnail;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner, ToolOutput};
pub use error::{MediaError, MediaResult};
pub use loudness::{analyze_loudness, apply_loudness, LoudnessMeasurement};
pub use silence::{detect_silence, merge_silences, parse_silence_output, SilenceInterval};
pub use source::SourceKind;
pub use templates::{CommandTemplates, TemplateKind, TemplateParams};
pub use thumbnail::{generate_thumbnail, store_thumbnail, ThumbnailOutcome};
