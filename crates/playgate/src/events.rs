// Events a playback engine pushes to the session that owns it.

use std::fmt;
use tokio::sync::mpsc;

use crate::tracks::{AudioTrack, QualityLevel};

/// Top-level error category reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorType {
    Network,
    Media,
    KeySystem,
    Mux,
    Other,
}

/// What exactly failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetails {
    ManifestLoadError,
    ManifestLoadTimeout,
    ManifestParsingError,
    LevelLoadError,
    LevelLoadTimeout,
    KeyLoadError,
    KeyLoadTimeout,
    FragLoadError,
    FragLoadTimeout,
    FragParsingError,
    BufferStalledError,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub fatal: bool,
    pub kind: ErrorType,
    pub details: ErrorDetails,
    /// Resource the failure relates to, when there is one
    pub url: Option<String>,
    pub reason: Option<String>,
}

impl EngineError {
    pub fn fatal(kind: ErrorType, details: ErrorDetails) -> Self {
        Self {
            fatal: true,
            kind,
            details,
            url: None,
            reason: None,
        }
    }

    pub fn notice(kind: ErrorType, details: ErrorDetails) -> Self {
        Self {
            fatal: false,
            ..Self::fatal(kind, details)
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?}/{:?}",
            if self.fatal { "fatal" } else { "non-fatal" },
            self.kind,
            self.details
        )?;
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Manifest loaded; the quality catalogue is replaced wholesale
    ManifestParsed { levels: Vec<QualityLevel> },
    AudioTracksUpdated { tracks: Vec<AudioTrack> },
    /// A fragment arrived intact
    FragmentLoaded { level: usize, sequence: u64, bytes: usize },
    Error(EngineError),
}

/// Sending half of an engine subscription, handed to the engine at construction
pub type EventSink = mpsc::UnboundedSender<EngineEvent>;
/// Receiving half, owned by the session for the lifetime of one attachment
pub type EventStream = mpsc::UnboundedReceiver<EngineEvent>;

/// Create a fresh subscription channel
pub fn subscription() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}

/// Handlers for the named engine events
pub trait EngineListener {
    fn on_manifest_parsed(&mut self, levels: Vec<QualityLevel>);
    fn on_audio_tracks_updated(&mut self, tracks: Vec<AudioTrack>);
    fn on_fragment_loaded(&mut self, _level: usize, _sequence: u64, _bytes: usize) {}
    fn on_error(&mut self, error: EngineError);
}

impl EngineEvent {
    /// Route this event to the matching listener handler
    pub fn dispatch<L: EngineListener + ?Sized>(self, listener: &mut L) {
        match self {
            EngineEvent::ManifestParsed { levels } => listener.on_manifest_parsed(levels),
            EngineEvent::AudioTracksUpdated { tracks } => listener.on_audio_tracks_updated(tracks),
            EngineEvent::FragmentLoaded {
                level,
                sequence,
                bytes,
            } => listener.on_fragment_loaded(level, sequence, bytes),
            EngineEvent::Error(error) => listener.on_error(error),
        }
    }
}
