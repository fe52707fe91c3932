//! # Stream session
//!
//! Supervises one attachment of one [`Source`] to a [`MediaSurface`]:
//! builds the playback engine, classifies the failures it reports, applies
//! the segment retry policy and tells the host when the server is dead.
//!
//! The session owns its surface, so a surface can only ever be driven by
//! one session. It owns at most one engine handle; every teardown path
//! (re-attach, detach, terminal failure, drop) goes through
//! `release_engine`.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::classify::{FailureClass, classify};
use crate::engine::{EngineFactory, HLS_MIME_TYPE, MediaSurface, PlaybackEngine};
use crate::events::{EngineError, EngineEvent, EngineListener, EventStream, subscription};
use crate::source::{DeliveryKind, ServerStatus, Source};
use crate::tracks::{AUTO_QUALITY, AudioTrack, QualityLevel, select_audio_track};
use crate::{PlaygateError, SessionConfig};

/// Host notification: `(server_index, status)`
pub type StatusCallback = Arc<dyn Fn(usize, ServerStatus) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Engine built, waiting for the manifest
    Attaching,
    Healthy,
    RecoveringMedia,
    RetryingSegment,
    Failed,
    Detached,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Detached)
    }
}

/// How the current source is bound to the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPath {
    /// Through a playback engine handle
    Adaptive,
    /// Manifest URL handed to the surface's native player
    NativeManifest,
    /// Direct progressive file
    Progressive,
}

pub struct StreamSession<F, S> {
    config: SessionConfig,
    factory: F,
    surface: S,
    on_status: Option<StatusCallback>,

    source: Option<Source>,
    path: Option<PlaybackPath>,
    engine: Option<Box<dyn PlaybackEngine>>,
    events: Option<EventStream>,
    state: SessionState,
    reported_working: bool,

    levels: Vec<QualityLevel>,
    selected_quality: i32,
    audio_tracks: BTreeMap<u32, AudioTrack>,
    selected_audio: Option<u32>,

    segment_retries: u32,
    network_error: bool,
}

impl<F, S> StreamSession<F, S>
where
    F: EngineFactory,
    S: MediaSurface,
{
    pub fn new(factory: F, surface: S, config: SessionConfig) -> Self {
        Self {
            config,
            factory,
            surface,
            on_status: None,
            source: None,
            path: None,
            engine: None,
            events: None,
            state: SessionState::Idle,
            reported_working: false,
            levels: Vec::new(),
            selected_quality: AUTO_QUALITY,
            audio_tracks: BTreeMap::new(),
            selected_audio: None,
            segment_retries: 0,
            network_error: false,
        }
    }

    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.on_status = Some(callback);
        self
    }

    /// Bind `source` to the surface, tearing down any previous attachment first.
    pub fn attach(&mut self, source: Source) -> Result<(), PlaygateError> {
        self.release_engine();
        self.surface.clear_source();

        self.segment_retries = 0;
        self.network_error = false;
        self.reported_working = false;
        self.levels.clear();
        self.audio_tracks.clear();
        self.selected_audio = None;
        self.path = None;
        self.state = SessionState::Attaching;
        self.source = Some(source.clone());

        match source.kind {
            DeliveryKind::Hls if self.factory.is_supported() => {
                let (sink, stream) = subscription();
                let mut engine = match self.factory.create(&self.config.engine, sink) {
                    Ok(engine) => engine,
                    Err(e) => {
                        error!(server_index = source.server_index, error = %e, "Failed to build playback engine");
                        self.state = SessionState::Failed;
                        return Err(e);
                    }
                };
                engine.load_source(&source.link);
                engine.attach_media(&mut self.surface);

                self.engine = Some(engine);
                self.events = Some(stream);
                self.path = Some(PlaybackPath::Adaptive);
                info!(
                    server_index = source.server_index,
                    url = %source.link,
                    "Attached adaptive stream"
                );
            }
            DeliveryKind::Hls if self.surface.can_play_type(HLS_MIME_TYPE) => {
                self.bind_native(&source, PlaybackPath::NativeManifest);
            }
            DeliveryKind::Hls => {
                warn!(
                    server_index = source.server_index,
                    url = %source.link,
                    "Neither an adaptive engine nor native manifest playback is available"
                );
                self.state = SessionState::Failed;
                return Err(PlaygateError::NoPlaybackPath(source.link));
            }
            DeliveryKind::Progressive => {
                self.bind_native(&source, PlaybackPath::Progressive);
            }
        }

        Ok(())
    }

    /// Release the engine and unbind the surface. Safe from any state.
    pub fn detach(&mut self) {
        self.release_engine();
        self.surface.clear_source();
        if let Some(source) = &self.source {
            debug!(server_index = source.server_index, "Session detached");
        }
        self.state = SessionState::Detached;
    }

    /// Select a quality index, `-1` for automatic
    pub fn set_quality(&mut self, index: i32) {
        self.selected_quality = index;
        if let Some(engine) = self.engine.as_mut() {
            engine.set_current_level(index);
        }
    }

    pub fn set_audio_track(&mut self, id: u32) {
        self.selected_audio = Some(id);
        if let Some(engine) = self.engine.as_mut() {
            engine.set_audio_track(id);
        }
    }

    /// Handle every event already queued by the engine. Returns how many were handled.
    pub fn pump_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let event = match self.events.as_mut().map(|rx| rx.try_recv()) {
                Some(Ok(event)) => event,
                _ => break,
            };
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for the next engine event.
    ///
    /// Returns `None` at once when no engine is attached, or when the engine
    /// stopped reporting.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    pub fn handle_event(&mut self, event: EngineEvent) {
        match self.state {
            SessionState::Attaching
            | SessionState::Healthy
            | SessionState::RecoveringMedia
            | SessionState::RetryingSegment => event.dispatch(self),
            state => trace!(?state, ?event, "Dropping engine event outside an attachment"),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn playback_path(&self) -> Option<PlaybackPath> {
        self.path
    }

    pub fn levels(&self) -> &[QualityLevel] {
        &self.levels
    }

    pub fn selected_quality(&self) -> i32 {
        self.selected_quality
    }

    pub fn audio_tracks(&self) -> &BTreeMap<u32, AudioTrack> {
        &self.audio_tracks
    }

    pub fn selected_audio(&self) -> Option<u32> {
        self.selected_audio
    }

    pub fn network_error(&self) -> bool {
        self.network_error
    }

    pub fn segment_retries(&self) -> u32 {
        self.segment_retries
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    fn bind_native(&mut self, source: &Source, path: PlaybackPath) {
        self.surface.set_source(&source.link);
        self.path = Some(path);
        self.start_playback();
        self.mark_healthy();
        info!(
            server_index = source.server_index,
            url = %source.link,
            ?path,
            "Attached source for native playback"
        );
    }

    /// Optimistic play; a refusal leaves playback paused until the user acts.
    fn start_playback(&mut self) {
        if let Err(e) = self.surface.play() {
            debug!(error = %e, "Playback start refused, staying paused");
        }
    }

    fn server_index(&self) -> usize {
        self.source.as_ref().map_or(0, |s| s.server_index)
    }

    fn notify(&self, status: ServerStatus) {
        if let Some(callback) = &self.on_status {
            callback(self.server_index(), status);
        }
    }

    fn mark_healthy(&mut self) {
        self.state = SessionState::Healthy;
        if !self.reported_working {
            self.reported_working = true;
            self.notify(ServerStatus::Working);
        }
    }

    /// Irreversible for this attachment: flag, release, notify once.
    fn fail(&mut self, error: &EngineError) {
        if self.state == SessionState::Failed {
            return;
        }
        error!(
            server_index = self.server_index(),
            error = %error,
            url = error.url.as_deref().unwrap_or_default(),
            "Stream failed permanently"
        );
        self.network_error = true;
        self.state = SessionState::Failed;
        self.release_engine();
        self.notify(ServerStatus::Failed);
    }
}

impl<F, S> StreamSession<F, S> {
    fn release_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
            debug!("Released playback engine");
        }
        self.events = None;
    }
}

impl<F, S> EngineListener for StreamSession<F, S>
where
    F: EngineFactory,
    S: MediaSurface,
{
    fn on_manifest_parsed(&mut self, levels: Vec<QualityLevel>) {
        debug!(
            server_index = self.server_index(),
            levels = levels.len(),
            "Manifest parsed"
        );
        self.levels = levels;
        if self.selected_quality != AUTO_QUALITY {
            if let Some(engine) = self.engine.as_mut() {
                engine.set_current_level(self.selected_quality);
            }
        }
        self.start_playback();
        if self.state == SessionState::Attaching {
            self.mark_healthy();
        }
    }

    fn on_audio_tracks_updated(&mut self, tracks: Vec<AudioTrack>) {
        let chosen = select_audio_track(&tracks, &self.config.preferred_audio_language);
        self.audio_tracks = tracks.into_iter().map(|t| (t.id, t)).collect();

        match chosen {
            Some(id) => {
                debug!(id, "Selecting audio track");
                self.selected_audio = Some(id);
                if let Some(engine) = self.engine.as_mut() {
                    engine.set_audio_track(id);
                }
            }
            None => {
                if self
                    .selected_audio
                    .is_some_and(|id| !self.audio_tracks.contains_key(&id))
                {
                    self.selected_audio = None;
                }
            }
        }
    }

    fn on_fragment_loaded(&mut self, level: usize, sequence: u64, _bytes: usize) {
        match self.state {
            SessionState::RetryingSegment | SessionState::RecoveringMedia => {
                info!(
                    server_index = self.server_index(),
                    level, sequence, "Stream recovered"
                );
                self.mark_healthy();
            }
            SessionState::Attaching => self.mark_healthy(),
            _ => {}
        }
    }

    fn on_error(&mut self, error: EngineError) {
        match classify(&error) {
            FailureClass::Notice => {
                debug!(error = %error, "Ignoring non-fatal engine error");
            }
            FailureClass::RecoverableNetwork => {
                self.segment_retries += 1;
                if self.segment_retries <= self.config.segment_retry_limit {
                    warn!(
                        server_index = self.server_index(),
                        attempt = self.segment_retries,
                        error = %error,
                        "Retrying segment"
                    );
                    if let Some(engine) = self.engine.as_mut() {
                        engine.start_load();
                    }
                    self.state = SessionState::RetryingSegment;
                } else {
                    self.fail(&error);
                }
            }
            FailureClass::Media => {
                warn!(
                    server_index = self.server_index(),
                    error = %error,
                    "Recovering media error"
                );
                if let Some(engine) = self.engine.as_mut() {
                    engine.recover_media_error();
                }
                self.state = SessionState::RecoveringMedia;
            }
            FailureClass::StructuralNetwork | FailureClass::UnclassifiedFatal => {
                self.fail(&error);
            }
        }
    }
}

impl<F, S> Drop for StreamSession<F, S> {
    fn drop(&mut self) {
        self.release_engine();
    }
}
