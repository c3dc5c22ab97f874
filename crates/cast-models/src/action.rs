//! Pipeline action identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The fixed set of pipeline steps a worker knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    /// Create recording, live-segment and mass-storage directories
    Prepare,
    /// Capture a source until its scheduled end
    Stream,
    /// Produce the final deliverable from captured files
    Transcode,
    /// Fetch an uploaded recording into the recording root
    Upload,
    /// Generate (or composite) a preview image
    Thumbnail,
    /// Resolve a pushed stream key into a scheduled stream
    SelfStream,
    /// Find silent stretches in the transcoded file
    SilenceDetect,
    /// Two-pass loudness normalization
    AudioNormalize,
}

impl ActionType {
    /// All action types in declaration order.
    pub const ALL: [ActionType; 8] = [
        ActionType::Prepare,
        ActionType::Stream,
        ActionType::Transcode,
        ActionType::Upload,
        ActionType::Thumbnail,
        ActionType::SelfStream,
        ActionType::SilenceDetect,
        ActionType::AudioNormalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Prepare => "prepare",
            ActionType::Stream => "stream",
            ActionType::Transcode => "transcode",
            ActionType::Upload => "upload",
            ActionType::Thumbnail => "thumbnail",
            ActionType::SelfStream => "self-stream",
            ActionType::SilenceDetect => "silence-detect",
            ActionType::AudioNormalize => "audio-normalize",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known action.
#[derive(Debug, Clone, Error)]
#[error("unknown action type: {0}")]
pub struct ParseActionTypeError(pub String);

impl FromStr for ActionType {
    type Err = ParseActionTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseActionTypeError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_serde_uses_kebab_case() {
        let json = serde_json::to_string(&ActionType::SilenceDetect).unwrap();
        assert_eq!(json, "\"silence-detect\"");

        let parsed: ActionType = serde_json::from_str("\"self-stream\"").unwrap();
        assert_eq!(parsed, ActionType::SelfStream);
    }

    #[test]
    fn test_action_type_from_str_matches_display() {
        for t in ActionType::ALL {
            assert_eq!(t.to_string().parse::<ActionType>().unwrap(), t);
        }
        assert!("encode".parse::<ActionType>().is_err());
    }
}
