//! Media kind tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse media classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaKind {
    Video,
    Gif,
    Image,
    Audio,
    Unknown,
}

impl MediaKind {
    /// Every kind a transform can accept.
    pub const ANY: [MediaKind; 4] = [
        MediaKind::Video,
        MediaKind::Gif,
        MediaKind::Image,
        MediaKind::Audio,
    ];

    /// Kinds with pixels.
    pub const VISUAL: [MediaKind; 3] = [MediaKind::Video, MediaKind::Gif, MediaKind::Image];

    /// Kinds that have a timeline.
    pub const ANIMATED: [MediaKind; 3] = [MediaKind::Video, MediaKind::Gif, MediaKind::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "VIDEO",
            MediaKind::Gif => "GIF",
            MediaKind::Image => "IMAGE",
            MediaKind::Audio => "AUDIO",
            MediaKind::Unknown => "UNKNOWN",
        }
    }

    pub fn has_pixels(&self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Gif | MediaKind::Image)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_serde_agree() {
        for kind in MediaKind::ANY {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_has_pixels() {
        assert!(MediaKind::Gif.has_pixels());
        assert!(!MediaKind::Audio.has_pixels());
        assert!(!MediaKind::Unknown.has_pixels());
    }
}
