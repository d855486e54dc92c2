use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How correspondences between a posed model and the scene are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackForceMode {
    /// Pair every model sample with its nearest scene point.
    #[default]
    ClosestPoint,
    /// Register the model against the scene with ICP on every query.
    FrameByFrameIcp,
    /// Register once per object and reuse the result, trusting it less as the
    /// object moves away from where it was registered.
    CachedIcp,
}

impl FeedbackForceMode {
    /// All modes.
    pub const ALL: [FeedbackForceMode; 3] = [
        FeedbackForceMode::ClosestPoint,
        FeedbackForceMode::FrameByFrameIcp,
        FeedbackForceMode::CachedIcp,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            FeedbackForceMode::ClosestPoint => "closest_point",
            FeedbackForceMode::FrameByFrameIcp => "frame_by_frame_icp",
            FeedbackForceMode::CachedIcp => "cached_icp",
        }
    }
}

impl fmt::Display for FeedbackForceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackForceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("unknown feedback force mode: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        for mode in FeedbackForceMode::ALL {
            assert_eq!(mode.to_string().parse::<FeedbackForceMode>(), Ok(mode));
        }
        assert!("icp".parse::<FeedbackForceMode>().is_err());
        assert_eq!(
            FeedbackForceMode::default(),
            FeedbackForceMode::ClosestPoint
        );
    }
}
