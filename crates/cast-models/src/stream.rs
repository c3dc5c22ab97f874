//! Stream version tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which camera feed a recording belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamVersion {
    /// Presentation (slides) feed
    Pres,
    /// Camera feed
    Cam,
    /// Combined picture-in-picture feed
    #[default]
    Comb,
}

impl StreamVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamVersion::Pres => "PRES",
            StreamVersion::Cam => "CAM",
            StreamVersion::Comb => "COMB",
        }
    }
}

impl fmt::Display for StreamVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
