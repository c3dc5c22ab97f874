//! Silence detection.
//!
//! Runs the media tool's `silencedetect` filter, pairs the
//! `silence_start`/`silence_end` markers it prints into intervals, and
//! merges intervals that sit close together so that a lecture's pauses
//! collapse into a handful of skippable stretches.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::templates::{CommandTemplates, TemplateKind, TemplateParams};

/// Intervals closer together than this (in seconds) are merged.
pub const MERGE_THRESHOLD_SECS: f64 = 30.0;

/// A silent stretch, in seconds from the start of the file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilenceInterval {
    pub start: f64,
    pub end: f64,
}

impl SilenceInterval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"silence_(start|end):\s*(\S+)").expect("silence marker regex is valid")
    })
}

/// Parse `silencedetect` output into chronological intervals.
///
/// A trailing `silence_start` with no matching end (silence running to the
/// end of the file) is dropped.
pub fn parse_silence_output(output: &str) -> MediaResult<Vec<SilenceInterval>> {
    let mut intervals = Vec::new();
    let mut open: Option<f64> = None;

    for caps in marker_regex().captures_iter(output) {
        let raw = &caps[2];
        let value: f64 = raw
            .parse()
            .map_err(|_| MediaError::SilenceParse(format!("`{}` is not a number", raw)))?;

        match &caps[1] {
            "start" => open = Some(value),
            _ => {
                let start = open.take().ok_or_else(|| {
                    MediaError::SilenceParse(format!("silence_end {} without a start", value))
                })?;
                intervals.push(SilenceInterval::new(start, value));
            }
        }
    }

    Ok(intervals)
}

/// Merge intervals that are less than [`MERGE_THRESHOLD_SECS`] apart.
///
/// A first interval starting within the threshold is extended back to 0.
/// The merge pass itself leaves sequences shorter than two untouched.
pub fn merge_silences(silences: Vec<SilenceInterval>) -> Vec<SilenceInterval> {
    let mut iter = silences.into_iter();
    let Some(mut first) = iter.next() else {
        return Vec::new();
    };
    if first.start < MERGE_THRESHOLD_SECS {
        first.start = 0.0;
    }

    let mut merged = vec![first];
    for silence in iter {
        match merged.last_mut() {
            Some(last) if silence.start < last.end + MERGE_THRESHOLD_SECS => {
                last.end = silence.end;
            }
            _ => merged.push(silence),
        }
    }
    merged
}

/// Run silence detection on `input` and return merged intervals.
pub async fn detect_silence(
    templates: &CommandTemplates,
    input: &Path,
    cancel: CancellationToken,
) -> MediaResult<Vec<SilenceInterval>> {
    let params = TemplateParams::new().set_path("input", input);
    let cmd = FfmpegCommand::from_template(templates, TemplateKind::SilenceDetect, &params)?;

    let output = FfmpegRunner::new().with_cancel(cancel).run_capture(&cmd).await?;
    let raw = parse_silence_output(&output.stderr)?;
    debug!(input = %input.display(), count = raw.len(), "Parsed silence markers");

    Ok(merge_silences(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: f64, end: f64) -> SilenceInterval {
        SilenceInterval::new(start, end)
    }

    #[test]
    fn test_short_sequences_pass_through() {
        assert!(merge_silences(vec![]).is_empty());
        assert_eq!(merge_silences(vec![iv(50.0, 60.0)]), vec![iv(50.0, 60.0)]);
    }

    #[test]
    fn test_single_early_interval_clamps_to_zero() {
        assert_eq!(merge_silences(vec![iv(5.0, 10.0)]), vec![iv(0.0, 10.0)]);
    }

    #[test]
    fn test_early_first_interval_clamps_to_zero() {
        let merged = merge_silences(vec![iv(5.0, 10.0), iv(100.0, 120.0)]);
        assert_eq!(merged, vec![iv(0.0, 10.0), iv(100.0, 120.0)]);
    }

    #[test]
    fn test_close_intervals_merge() {
        let merged = merge_silences(vec![iv(40.0, 50.0), iv(55.0, 65.0)]);
        assert_eq!(merged, vec![iv(40.0, 65.0)]);
    }

    #[test]
    fn test_distant_intervals_stay_apart() {
        let merged = merge_silences(vec![iv(40.0, 50.0), iv(90.0, 100.0)]);
        assert_eq!(merged, vec![iv(40.0, 50.0), iv(90.0, 100.0)]);
    }

    #[test]
    fn test_merge_chains_through_the_retained_interval() {
        let merged = merge_silences(vec![
            iv(100.0, 110.0),
            iv(120.0, 130.0),
            iv(150.0, 160.0),
            iv(300.0, 310.0),
        ]);
        assert_eq!(merged, vec![iv(100.0, 160.0), iv(300.0, 310.0)]);
    }

    #[test]
    fn test_merged_output_has_no_close_neighbours() {
        let mut input = Vec::new();
        let mut cursor = 40.0;
        for i in 0..50 {
            cursor += if i % 7 == 0 { 45.0 } else { 12.0 };
            input.push(iv(cursor, cursor + 5.0));
            cursor += 5.0;
        }
        let merged = merge_silences(input);
        for pair in merged.windows(2) {
            assert!(pair[1].start >= pair[0].end + MERGE_THRESHOLD_SECS);
            assert!(pair[0].start < pair[1].start);
        }
    }

    #[test]
    fn test_parse_ffmpeg_output() {
        let output = "\
[silencedetect @ 0x55d0] silence_start: 12.5
[silencedetect @ 0x55d0] silence_end: 20.25 | silence_duration: 7.75
size=N/A time=00:01:00.00 bitrate=N/A speed= 600x
[silencedetect @ 0x55d0] silence_start: 42
[silencedetect @ 0x55d0] silence_end: 80 | silence_duration: 38
[silencedetect @ 0x55d0] silence_start: 3590.1
";
        let parsed = parse_silence_output(output).unwrap();
        assert_eq!(parsed, vec![iv(12.5, 20.25), iv(42.0, 80.0)]);
    }

    #[test]
    fn test_parse_rejects_non_numeric_markers() {
        let err = parse_silence_output("silence_start: abc").unwrap_err();
        assert!(matches!(err, MediaError::SilenceParse(_)));
    }

    #[test]
    fn test_parse_rejects_end_without_start() {
        assert!(parse_silence_output("silence_end: 4.0 | silence_duration: 4.0").is_err());
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_silence_output("no markers here").unwrap().is_empty());
    }
}
