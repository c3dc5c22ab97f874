//! Two-pass loudness normalization.
//!
//! Pass one runs `loudnorm` in analysis mode and reads the JSON block it
//! prints to stderr. Pass two feeds those measurements back in for a
//! linear, single-step correction.

use std::path::Path;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::templates::{CommandTemplates, TemplateKind, TemplateParams};

/// Measurements reported by the analysis pass.
///
/// The tool prints every value as a JSON string, so they are kept verbatim
/// and passed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoudnessMeasurement {
    pub input_i: String,
    pub input_tp: String,
    pub input_lra: String,
    pub input_thresh: String,
    pub target_offset: String,
}

impl LoudnessMeasurement {
    /// Extract the measurement block from analysis-pass stderr.
    pub fn parse(stderr: &str) -> MediaResult<Self> {
        let start = stderr
            .rfind('{')
            .ok_or_else(|| MediaError::Loudness("no JSON block in output".to_string()))?;
        let end = stderr[start..]
            .find('}')
            .map(|i| start + i + 1)
            .ok_or_else(|| MediaError::Loudness("unterminated JSON block".to_string()))?;

        let measurement: LoudnessMeasurement = serde_json::from_str(&stderr[start..end])
            .map_err(|e| MediaError::Loudness(e.to_string()))?;

        // A silent track reports "-inf", which pass two rejects.
        if measurement.input_i.contains("inf") {
            return Err(MediaError::Loudness(format!(
                "integrated loudness is {}",
                measurement.input_i
            )));
        }
        Ok(measurement)
    }
}

/// Pass one: measure loudness of `input`.
pub async fn analyze_loudness(
    templates: &CommandTemplates,
    input: &Path,
    cancel: CancellationToken,
) -> MediaResult<LoudnessMeasurement> {
    let params = TemplateParams::new().set_path("input", input);
    let cmd = FfmpegCommand::from_template(templates, TemplateKind::LoudnessAnalyze, &params)?;
    let output = FfmpegRunner::new().with_cancel(cancel).run_capture(&cmd).await?;
    LoudnessMeasurement::parse(&output.stderr)
}

/// Pass two: render `input` to `output` with the measured correction.
pub async fn apply_loudness(
    templates: &CommandTemplates,
    input: &Path,
    output: &Path,
    measurement: &LoudnessMeasurement,
    cancel: CancellationToken,
) -> MediaResult<()> {
    let params = TemplateParams::new()
        .set_path("input", input)
        .set_path("output", output)
        .set("measured_i", measurement.input_i.as_str())
        .set("measured_tp", measurement.input_tp.as_str())
        .set("measured_lra", measurement.input_lra.as_str())
        .set("measured_thresh", measurement.input_thresh.as_str())
        .set("offset", measurement.target_offset.as_str());
    let cmd = FfmpegCommand::from_template(templates, TemplateKind::LoudnessApply, &params)?;
    FfmpegRunner::new().with_cancel(cancel).run(&cmd).await
}
