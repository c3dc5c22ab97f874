//! Typed execution context threaded through a job's actions.
//!
//! A `JobContext` is a value: actions take one, and hand back an extended
//! copy through the `with_*` methods. Readers return
//! [`WorkerError::MissingContextValue`] naming the key when an earlier step
//! never wrote it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use cast_media::SilenceInterval;
use cast_models::StreamVersion;

use crate::error::{WorkerError, WorkerResult};

/// Per-stream directories under the three storage roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directories {
    pub recording: PathBuf,
    pub segments: PathBuf,
    pub mass: PathBuf,
}

impl Directories {
    pub fn all(&self) -> [&Path; 3] {
        [&self.recording, &self.segments, &self.mass]
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobContext {
    stream: Option<String>,
    course: Option<String>,
    version: Option<StreamVersion>,
    source: Option<String>,
    end: Option<DateTime<Utc>>,
    action_id: Option<String>,
    hostname: Option<String>,
    stream_key: Option<String>,
    directories: Option<Directories>,
    files: Option<Vec<PathBuf>>,
    transcoded_file: Option<PathBuf>,
    thumbnail: Option<PathBuf>,
    silences: Option<Vec<SilenceInterval>>,
}

fn require<'a, T: ?Sized>(value: Option<&'a T>, key: &'static str) -> WorkerResult<&'a T> {
    value.ok_or(WorkerError::MissingContextValue { key })
}

impl JobContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(&self) -> WorkerResult<&str> {
        require(self.stream.as_deref(), "stream")
    }

    pub fn course(&self) -> WorkerResult<&str> {
        require(self.course.as_deref(), "course")
    }

    pub fn version(&self) -> WorkerResult<StreamVersion> {
        self.version.ok_or(WorkerError::missing("version"))
    }

    pub fn source(&self) -> WorkerResult<&str> {
        require(self.source.as_deref(), "source")
    }

    pub fn end(&self) -> WorkerResult<DateTime<Utc>> {
        self.end.ok_or(WorkerError::missing("end"))
    }

    pub fn action_id(&self) -> WorkerResult<&str> {
        require(self.action_id.as_deref(), "action_id")
    }

    pub fn hostname(&self) -> WorkerResult<&str> {
        require(self.hostname.as_deref(), "hostname")
    }

    pub fn stream_key(&self) -> WorkerResult<&str> {
        require(self.stream_key.as_deref(), "stream_key")
    }

    pub fn directories(&self) -> WorkerResult<&Directories> {
        require(self.directories.as_ref(), "directories")
    }

    /// Files captured or fetched so far. May be empty.
    pub fn files(&self) -> WorkerResult<&[PathBuf]> {
        require(self.files.as_deref(), "files")
    }

    pub fn transcoded_file(&self) -> WorkerResult<&Path> {
        require(self.transcoded_file.as_deref(), "transcoded_file")
    }

    pub fn thumbnail(&self) -> WorkerResult<&Path> {
        require(self.thumbnail.as_deref(), "thumbnail")
    }

    pub fn silences(&self) -> WorkerResult<&[SilenceInterval]> {
        require(self.silences.as_deref(), "silences")
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    pub fn with_course(mut self, course: impl Into<String>) -> Self {
        self.course = Some(course.into());
        self
    }

    pub fn with_version(mut self, version: StreamVersion) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_stream_key(mut self, key: impl Into<String>) -> Self {
        self.stream_key = Some(key.into());
        self
    }

    pub fn with_directories(mut self, directories: Directories) -> Self {
        self.directories = Some(directories);
        self
    }

    /// Append `files` to the accumulated list, creating it if needed.
    pub fn with_files(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.files.get_or_insert_with(Vec::new).extend(files);
        self
    }

    pub fn with_transcoded_file(mut self, path: PathBuf) -> Self {
        self.transcoded_file = Some(path);
        self
    }

    pub fn with_thumbnail(mut self, path: PathBuf) -> Self {
        self.thumbnail = Some(path);
        self
    }

    pub fn with_silences(mut self, silences: Vec<SilenceInterval>) -> Self {
        self.silences = Some(silences);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_value_names_key() {
        let ctx = JobContext::new();
        match ctx.files() {
            Err(WorkerError::MissingContextValue { key }) => assert_eq!(key, "files"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(ctx.transcoded_file().is_err());
        assert!(ctx.end().is_err());
    }

    #[test]
    fn test_extending_leaves_original_untouched() {
        let base = JobContext::new().with_stream("1");
        let extended = base.clone().with_course("2");

        assert!(base.course().is_err());
        assert_eq!(extended.stream().unwrap(), "1");
        assert_eq!(extended.course().unwrap(), "2");
    }

    #[test]
    fn test_files_accumulate() {
        let ctx = JobContext::new()
            .with_files(vec![PathBuf::from("0.ts")])
            .with_files(vec![PathBuf::from("1.ts")]);
        assert_eq!(ctx.files().unwrap(), &[PathBuf::from("0.ts"), PathBuf::from("1.ts")]);
    }

    #[test]
    fn test_empty_file_list_is_present() {
        let ctx = JobContext::new().with_files(Vec::new());
        assert!(ctx.files().unwrap().is_empty());
    }
}
