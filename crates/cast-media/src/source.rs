//! Capture source classification.

use url::Url;

/// How the capture input is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Network camera over RTSP
    Rtsp,
    /// Pushed or pulled RTMP stream
    Rtmp,
    /// Anything else, read as a file
    File,
}

/// RTMP read timeout in microseconds.
const RTMP_RW_TIMEOUT_US: &str = "10000000";

impl SourceKind {
    /// Classify a source locator by its URL scheme.
    pub fn detect(source: &str) -> Self {
        match Url::parse(source) {
            Ok(url) => match url.scheme() {
                "rtsp" | "rtsps" => SourceKind::Rtsp,
                "rtmp" | "rtmps" => SourceKind::Rtmp,
                _ => SourceKind::File,
            },
            Err(_) => SourceKind::File,
        }
    }

    /// Transport-specific flags placed before `-i`.
    pub fn input_flags(&self) -> Vec<String> {
        let flags: &[&str] = match self {
            SourceKind::Rtsp => &["-rtsp_transport", "tcp"],
            SourceKind::Rtmp => &["-rw_timeout", RTMP_RW_TIMEOUT_US],
            SourceKind::File => &["-re"],
        };
        flags.iter().map(|s| s.to_string()).collect()
    }
}
