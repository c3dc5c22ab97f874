//! External command templates.
//!
//! A template is a whitespace-separated argument list with `{name}`
//! placeholders. Placeholders are substituted after splitting, so a value
//! containing spaces (a path, say) stays a single argument. A placeholder
//! that makes up a whole token may be bound to a list, which expands into
//! several arguments (or none).

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{MediaError, MediaResult};

/// Which template to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Stream,
    Transcode,
    SilenceDetect,
    Thumbnail,
    LoudnessAnalyze,
    LoudnessApply,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TemplateKind::Stream => "stream",
            TemplateKind::Transcode => "transcode",
            TemplateKind::SilenceDetect => "silence_detect",
            TemplateKind::Thumbnail => "thumbnail",
            TemplateKind::LoudnessAnalyze => "loudness_analyze",
            TemplateKind::LoudnessApply => "loudness_apply",
        };
        f.write_str(name)
    }
}

/// Argument templates for every media-tool invocation the worker makes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    /// Capture: `{input_flags} {duration} {source} {archive} {segment_pattern} {playlist}`
    pub stream: String,
    /// Final deliverable: `{input} {output}`
    pub transcode: String,
    /// Silence scan: `{input}`
    pub silence_detect: String,
    /// Preview frame: `{input} {output}`
    pub thumbnail: String,
    /// Loudness pass one: `{input}`
    pub loudness_analyze: String,
    /// Loudness pass two: `{input} {output}` plus the measured values
    pub loudness_apply: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CommandTemplates {
    /// Templates used when no template file is configured.
    pub fn builtin() -> Self {
        Self {
            stream: "-y -hide_banner -nostats {input_flags} -t {duration} -i {source} \
                     -map 0 -c copy -f mpegts {archive} \
                     -map 0 -c:v libx264 -preset veryfast -tune zerolatency -maxrate 2500k -bufsize 3000k -g 60 \
                     -c:a aac -ar 44100 -b:a 128k \
                     -f hls -hls_time 2 -hls_list_size 3600 -hls_playlist_type event -hls_flags append_list \
                     -hls_segment_filename {segment_pattern} {playlist}"
                .to_string(),
            transcode: "-y -hide_banner -nostats -i {input} -c:v libx264 -preset veryfast -crf 23 \
                        -c:a aac -b:a 128k -movflags +faststart {output}"
                .to_string(),
            silence_detect: "-hide_banner -nostats -i {input} -vn -af silencedetect=n=-15dB:d=15 -f null -"
                .to_string(),
            thumbnail: "-y -v error -ss 00:00:10 -i {input} -vframes 1 -vf scale=480:-2 {output}"
                .to_string(),
            loudness_analyze: "-hide_banner -nostats -i {input} -vn \
                               -af loudnorm=I=-16:TP=-1.5:LRA=11:print_format=json -f null -"
                .to_string(),
            loudness_apply: "-y -v error -i {input} \
                             -af loudnorm=I=-16:TP=-1.5:LRA=11:measured_I={measured_i}:measured_TP={measured_tp}:measured_LRA={measured_lra}:measured_thresh={measured_thresh}:offset={offset}:linear=true \
                             -c:v copy -c:a aac -b:a 128k {output}"
                .to_string(),
        }
    }

    /// A template set with nothing in it. Rendering any kind fails.
    pub fn empty() -> Self {
        Self {
            stream: String::new(),
            transcode: String::new(),
            silence_detect: String::new(),
            thumbnail: String::new(),
            loudness_analyze: String::new(),
            loudness_apply: String::new(),
        }
    }

    /// Load templates from a TOML/JSON/YAML file.
    ///
    /// Keys missing from the file keep their built-in value. A file that
    /// cannot be read or parsed is logged and yields [`CommandTemplates::empty`].
    pub fn load(path: &Path) -> Self {
        let loaded = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .and_then(|c| c.try_deserialize::<CommandTemplates>());

        match loaded {
            Ok(templates) => {
                info!(path = %path.display(), "Loaded command templates");
                templates
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not load command templates, leaving them empty"
                );
                Self::empty()
            }
        }
    }

    fn get(&self, kind: TemplateKind) -> &str {
        match kind {
            TemplateKind::Stream => &self.stream,
            TemplateKind::Transcode => &self.transcode,
            TemplateKind::SilenceDetect => &self.silence_detect,
            TemplateKind::Thumbnail => &self.thumbnail,
            TemplateKind::LoudnessAnalyze => &self.loudness_analyze,
            TemplateKind::LoudnessApply => &self.loudness_apply,
        }
    }

    /// Render a template into an argument vector.
    pub fn render(&self, kind: TemplateKind, params: &TemplateParams) -> MediaResult<Vec<String>> {
        let template = self.get(kind);
        if template.trim().is_empty() {
            return Err(MediaError::template(format!("{} template is empty", kind)));
        }

        let mut args = Vec::new();
        for token in template.split_whitespace() {
            render_token(token, params, &mut args)
                .map_err(|e| MediaError::template(format!("{} template: {}", kind, e)))?;
        }
        Ok(args)
    }
}

#[derive(Debug, Clone)]
enum TemplateValue {
    One(String),
    Many(Vec<String>),
}

/// Named values substituted into a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateParams {
    values: HashMap<String, TemplateValue>,
}

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a single value.
    pub fn set(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values
            .insert(name.to_string(), TemplateValue::One(value.into()));
        self
    }

    /// Bind a path, lossily converted to UTF-8.
    pub fn set_path(self, name: &str, path: &Path) -> Self {
        self.set(name, path.to_string_lossy())
    }

    /// Bind a list; only valid where the placeholder is a whole token.
    pub fn set_many<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values.insert(
            name.to_string(),
            TemplateValue::Many(values.into_iter().map(Into::into).collect()),
        );
        self
    }
}

fn render_token(token: &str, params: &TemplateParams, out: &mut Vec<String>) -> Result<(), String> {
    if let Some(name) = token.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        if let Some(TemplateValue::Many(values)) = params.values.get(name) {
            out.extend(values.iter().cloned());
            return Ok(());
        }
    }

    let mut rendered = String::with_capacity(token.len());
    let mut rest = token;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| format!("unterminated placeholder in `{}`", token))?;
        let name = &after[..close];
        match params.values.get(name) {
            Some(TemplateValue::One(value)) => rendered.push_str(value),
            Some(TemplateValue::Many(_)) => {
                return Err(format!("list placeholder `{{{}}}` must be a whole argument", name))
            }
            None => return Err(format!("unknown placeholder `{{{}}}`", name)),
        }
        rest = &after[close + 1..];
    }
    rendered.push_str(rest);
    out.push(rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_render_keeps_paths_with_spaces_whole() {
        let templates = CommandTemplates::builtin();
        let params = TemplateParams::new()
            .set("input", "/rec/Lecture Hall/1.ts")
            .set("output", "/out/final.mp4");

        let args = templates.render(TemplateKind::Transcode, &params).unwrap();
        assert!(args.contains(&"/rec/Lecture Hall/1.ts".to_string()));
        assert_eq!(args.last().unwrap(), "/out/final.mp4");
    }

    #[test]
    fn test_render_expands_list_placeholders() {
        let mut templates = CommandTemplates::empty();
        templates.stream = "{input_flags} -i {source}".to_string();

        let params = TemplateParams::new()
            .set_many("input_flags", ["-rtsp_transport", "tcp"])
            .set("source", "rtsp://cam");
        let args = templates.render(TemplateKind::Stream, &params).unwrap();
        assert_eq!(args, vec!["-rtsp_transport", "tcp", "-i", "rtsp://cam"]);

        let params = TemplateParams::new()
            .set_many("input_flags", Vec::<String>::new())
            .set("source", "file.mp4");
        let args = templates.render(TemplateKind::Stream, &params).unwrap();
        assert_eq!(args, vec!["-i", "file.mp4"]);
    }

    #[test]
    fn test_render_substitutes_several_placeholders_in_one_token() {
        let mut templates = CommandTemplates::empty();
        templates.loudness_apply = "loudnorm=measured_I={i}:offset={o}".to_string();
        let params = TemplateParams::new().set("i", "-27.2").set("o", "0.4");
        let args = templates.render(TemplateKind::LoudnessApply, &params).unwrap();
        assert_eq!(args, vec!["loudnorm=measured_I=-27.2:offset=0.4"]);
    }

    #[test]
    fn test_render_rejects_unknown_and_unterminated_placeholders() {
        let mut templates = CommandTemplates::empty();
        templates.thumbnail = "-i {input} {nope}".to_string();
        let params = TemplateParams::new().set("input", "a");
        assert!(matches!(
            templates.render(TemplateKind::Thumbnail, &params),
            Err(MediaError::Template(_))
        ));

        templates.thumbnail = "-i {input".to_string();
        assert!(templates.render(TemplateKind::Thumbnail, &params).is_err());
    }

    #[test]
    fn test_empty_template_fails_to_render() {
        let templates = CommandTemplates::empty();
        let err = templates
            .render(TemplateKind::SilenceDetect, &TemplateParams::new())
            .unwrap_err();
        assert!(err.to_string().contains("silence_detect template is empty"));
    }

    #[test]
    fn test_load_partial_file_keeps_builtin_for_missing_keys() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "transcode = \"-i {{input}} {{output}}\"").unwrap();

        let templates = CommandTemplates::load(file.path());
        assert_eq!(templates.transcode, "-i {input} {output}");
        assert_eq!(templates.stream, CommandTemplates::builtin().stream);
    }

    #[test]
    fn test_load_malformed_file_leaves_templates_empty() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "stream = [unterminated").unwrap();

        let templates = CommandTemplates::load(file.path());
        assert_eq!(templates, CommandTemplates::empty());
    }
}
