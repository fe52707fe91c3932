// Quality levels and audio renditions reported by the playback engine.

use serde::{Deserialize, Serialize};

/// Selected quality index meaning "let the engine decide"
pub const AUTO_QUALITY: i32 = -1;

/// One selectable bitrate/resolution variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLevel {
    pub bitrate: u64,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub codecs: Option<String>,
    pub name: Option<String>,
    pub url: String,
}

impl QualityLevel {
    /// Short label such as `1080p` or `2500 kbps`
    pub fn label(&self) -> String {
        match (self.height, &self.name) {
            (Some(height), _) => format!("{height}p"),
            (None, Some(name)) => name.clone(),
            (None, None) => format!("{} kbps", self.bitrate / 1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub id: u32,
    pub name: String,
    pub lang: Option<String>,
    pub group_id: String,
    pub default: bool,
    pub autoselect: bool,
    pub forced: bool,
    pub url: Option<String>,
}

impl AudioTrack {
    /// `true` when the primary language subtag equals `preferred` (`en-US` matches `en`)
    pub fn matches_language(&self, preferred: &str) -> bool {
        self.lang.as_deref().is_some_and(|lang| {
            let primary = lang.split(['-', '_']).next().unwrap_or(lang);
            primary.eq_ignore_ascii_case(preferred)
        })
    }
}

/// Pick the audio track to play.
///
/// The first track in the preferred language wins, then the first track
/// flagged default. `None` leaves the engine's own choice in place.
pub fn select_audio_track(tracks: &[AudioTrack], preferred: &str) -> Option<u32> {
    tracks
        .iter()
        .find(|t| t.matches_language(preferred))
        .or_else(|| tracks.iter().find(|t| t.default))
        .map(|t| t.id)
}
