//! # Playback engine capability
//!
//! The session drives an adaptive-bitrate engine and a presentation
//! surface through these traits. Neither is implemented by the session
//! itself: hosts plug in a real engine, the headless [`crate::hls`]
//! engine, or a test double.

use crate::events::EventSink;
use crate::{EngineConfig, PlaygateError};

/// MIME type a surface reports for native adaptive playback
pub const HLS_MIME_TYPE: &str = "application/vnd.apple.mpegurl";

/// Commands a session issues to the engine it owns.
///
/// Every command is fire-and-forget; outcomes come back as events on the
/// subscription the engine was created with.
pub trait PlaybackEngine: Send {
    fn load_source(&mut self, url: &str);

    fn attach_media(&mut self, surface: &mut dyn MediaSurface);

    /// Resume loading after a load failure
    fn start_load(&mut self);

    /// Reset the media pipeline in place after a decode/parse failure
    fn recover_media_error(&mut self);

    /// `-1` selects automatic quality
    fn set_current_level(&mut self, index: i32);

    fn set_audio_track(&mut self, id: u32);

    /// Abort in-flight work and release every resource.
    ///
    /// No event is delivered after this returns.
    fn destroy(&mut self);
}

/// Builds engine handles
pub trait EngineFactory {
    /// Whether adaptive playback through an engine is available on this platform
    fn is_supported(&self) -> bool;

    /// Build an engine that reports to `events`
    fn create(
        &self,
        config: &EngineConfig,
        events: EventSink,
    ) -> Result<Box<dyn PlaybackEngine>, PlaygateError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    #[error("Playback start not allowed: {0}")]
    NotAllowed(String),
    #[error("Playback start aborted: {0}")]
    Aborted(String),
}

/// The presentation surface a session plays into
pub trait MediaSurface {
    fn can_play_type(&self, mime: &str) -> bool;

    /// Bind a URL for native playback
    fn set_source(&mut self, url: &str);

    fn clear_source(&mut self);

    /// Start playback; may be refused (e.g. autoplay policy)
    fn play(&mut self) -> Result<(), PlayError>;
}
