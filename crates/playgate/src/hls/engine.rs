//! # Headless HLS engine
//!
//! A [`PlaybackEngine`] that walks an HLS presentation without decoding
//! it: manifest, level playlist, keys, init segments and fragments are
//! fetched in order and every fragment is sniffed before it is reported.
//!
//! The pipeline runs as a tokio task. Load failures are reported as fatal
//! events and the pipeline then parks until the owner calls
//! [`PlaybackEngine::start_load`] (retry the resource) or
//! [`PlaybackEngine::recover_media_error`] (skip a bad fragment).
//! Retry policy therefore lives entirely with the owner.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use m3u8_rs::ByteRange;
use reqwest::Client;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::loader::{HttpLoader, ResourceClass, ResourceLoader};
use super::playlist::{FragmentRef, ParsedManifest, fragments, parse_manifest, parse_media_playlist};
use super::sniff::{FragmentFormat, detect_format};
use crate::engine::{EngineFactory, MediaSurface, PlaybackEngine};
use crate::events::{EngineError, EngineEvent, ErrorDetails, ErrorType, EventSink};
use crate::tracks::{AUTO_QUALITY, QualityLevel};
use crate::{EngineConfig, HttpConfig, PlaygateError, create_client};

#[derive(Debug)]
enum Command {
    StartLoad,
    RecoverMedia,
    SetLevel(i32),
    SetAudio(u32),
}

/// How a parked pipeline was woken
enum Resume {
    Reload,
    Recover,
}

/// Builds [`HeadlessHlsEngine`]s sharing one HTTP client
pub struct HeadlessHlsFactory {
    http_client: Client,
}

impl HeadlessHlsFactory {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self, PlaygateError> {
        Ok(Self::new(create_client(config)?))
    }
}

impl EngineFactory for HeadlessHlsFactory {
    fn is_supported(&self) -> bool {
        Handle::try_current().is_ok()
    }

    fn create(
        &self,
        config: &EngineConfig,
        events: EventSink,
    ) -> Result<Box<dyn PlaybackEngine>, PlaygateError> {
        let runtime = Handle::try_current()
            .map_err(|e| PlaygateError::EngineError(format!("no async runtime: {e}")))?;
        let loader = Arc::new(HttpLoader::new(self.http_client.clone(), config.clone()));
        Ok(Box::new(HeadlessHlsEngine::with_loader(
            loader, events, runtime,
        )))
    }
}

pub struct HeadlessHlsEngine {
    loader: Arc<dyn ResourceLoader>,
    events: EventSink,
    runtime: Handle,
    commands: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
    requested_level: i32,
    audio_track: Option<u32>,
}

impl HeadlessHlsEngine {
    pub fn with_loader(loader: Arc<dyn ResourceLoader>, events: EventSink, runtime: Handle) -> Self {
        Self {
            loader,
            events,
            runtime,
            commands: None,
            task: None,
            requested_level: AUTO_QUALITY,
            audio_track: None,
        }
    }

    fn send(&self, command: Command) {
        match &self.commands {
            Some(tx) => {
                if tx.send(command).is_err() {
                    debug!("Pipeline already finished, command dropped");
                }
            }
            None => debug!("No source loaded, ignoring {:?}", command),
        }
    }

    fn stop_pipeline(&mut self) {
        self.commands = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl PlaybackEngine for HeadlessHlsEngine {
    fn load_source(&mut self, url: &str) {
        self.stop_pipeline();

        let manifest_url = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                let error = EngineError::fatal(ErrorType::Network, ErrorDetails::ManifestLoadError)
                    .with_url(url)
                    .with_reason(e.to_string());
                let _ = self.events.send(EngineEvent::Error(error));
                return;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline {
            loader: self.loader.clone(),
            events: self.events.clone(),
            commands: rx,
            manifest_url,
            requested_level: self.requested_level,
            audio_track: self.audio_track,
        };
        info!("Loading HLS source {}", url);
        self.commands = Some(tx);
        self.task = Some(self.runtime.spawn(pipeline.run()));
    }

    fn attach_media(&mut self, _surface: &mut dyn MediaSurface) {
        debug!("Headless engine: nothing to bind on the surface");
    }

    fn start_load(&mut self) {
        self.send(Command::StartLoad);
    }

    fn recover_media_error(&mut self) {
        self.send(Command::RecoverMedia);
    }

    fn set_current_level(&mut self, index: i32) {
        self.requested_level = index;
        self.send(Command::SetLevel(index));
    }

    fn set_audio_track(&mut self, id: u32) {
        self.audio_track = Some(id);
        self.send(Command::SetAudio(id));
    }

    fn destroy(&mut self) {
        self.stop_pipeline();
    }
}

impl Drop for HeadlessHlsEngine {
    fn drop(&mut self) {
        self.stop_pipeline();
    }
}

struct Pipeline {
    loader: Arc<dyn ResourceLoader>,
    events: EventSink,
    commands: mpsc::UnboundedReceiver<Command>,
    manifest_url: Url,
    requested_level: i32,
    audio_track: Option<u32>,
}

impl Pipeline {
    /// `false` once nobody listens any more
    fn emit(&self, event: EngineEvent) -> bool {
        self.events.send(event).is_ok()
    }

    fn apply(&mut self, command: Command) -> Option<Resume> {
        match command {
            Command::StartLoad => Some(Resume::Reload),
            Command::RecoverMedia => Some(Resume::Recover),
            Command::SetLevel(index) => {
                self.requested_level = index;
                None
            }
            Command::SetAudio(id) => {
                debug!("Audio track {} selected", id);
                self.audio_track = Some(id);
                None
            }
        }
    }

    /// Apply pending selections; resume commands are meaningless while loading
    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            let _ = self.apply(command);
        }
    }

    async fn wait_for_resume(&mut self) -> Option<Resume> {
        while let Some(command) = self.commands.recv().await {
            if let Some(resume) = self.apply(command) {
                return Some(resume);
            }
        }
        None
    }

    /// Auto quality plays the first listed level
    fn target_level(&self, count: usize) -> usize {
        usize::try_from(self.requested_level)
            .ok()
            .filter(|&index| index < count)
            .unwrap_or(0)
    }

    /// Load a resource, parking after each failure until told to retry
    async fn load_until_ok(
        &mut self,
        class: ResourceClass,
        url: &Url,
        byte_range: Option<&ByteRange>,
    ) -> Option<Bytes> {
        loop {
            match self.loader.load(class, url, byte_range).await {
                Ok(bytes) => return Some(bytes),
                Err(error) => {
                    warn!("{:?} load failed: {}", class, error);
                    if !self.emit(EngineEvent::Error(error)) {
                        return None;
                    }
                    self.wait_for_resume().await?;
                }
            }
        }
    }

    async fn run(mut self) {
        let manifest_url = self.manifest_url.clone();
        let Some(bytes) = self
            .load_until_ok(ResourceClass::Manifest, &manifest_url, None)
            .await
        else {
            return;
        };

        let (levels, mut prefetched) = match parse_manifest(&bytes, &manifest_url) {
            Ok(ParsedManifest::Master {
                levels,
                audio_tracks,
            }) => {
                if !self.emit(EngineEvent::ManifestParsed {
                    levels: levels.clone(),
                }) || !self.emit(EngineEvent::AudioTracksUpdated {
                    tracks: audio_tracks,
                }) {
                    return;
                }
                (levels, None)
            }
            Ok(ParsedManifest::Media(playlist)) => {
                let level = QualityLevel {
                    bitrate: 0,
                    width: None,
                    height: None,
                    codecs: None,
                    name: None,
                    url: manifest_url.to_string(),
                };
                if !self.emit(EngineEvent::ManifestParsed {
                    levels: vec![level.clone()],
                }) || !self.emit(EngineEvent::AudioTracksUpdated { tracks: Vec::new() })
                {
                    return;
                }
                (vec![level], Some(playlist))
            }
            Err(e) => {
                let error = EngineError::fatal(ErrorType::Network, ErrorDetails::ManifestParsingError)
                    .with_url(manifest_url.as_str())
                    .with_reason(e.to_string());
                self.emit(EngineEvent::Error(error));
                return;
            }
        };

        let mut next_sequence: Option<u64> = None;
        let mut loaded_key: Option<Url> = None;
        let mut loaded_init: Option<(Url, Option<ByteRange>)> = None;

        loop {
            self.drain_commands();
            let level_index = self.target_level(levels.len());
            let level_url = match Url::parse(&levels[level_index].url) {
                Ok(u) => u,
                Err(e) => {
                    let error = EngineError::fatal(ErrorType::Network, ErrorDetails::LevelLoadError)
                        .with_url(levels[level_index].url.as_str())
                        .with_reason(e.to_string());
                    self.emit(EngineEvent::Error(error));
                    return;
                }
            };

            debug!(
                "Loading level {} (audio track {:?})",
                level_index, self.audio_track
            );
            let playlist = match prefetched.take() {
                Some(playlist) => playlist,
                None => {
                    let Some(bytes) = self
                        .load_until_ok(ResourceClass::Level, &level_url, None)
                        .await
                    else {
                        return;
                    };
                    match parse_media_playlist(&bytes) {
                        Ok(playlist) => playlist,
                        Err(e) => {
                            let error = EngineError::fatal(
                                ErrorType::Network,
                                ErrorDetails::Other("LevelParsingError".to_string()),
                            )
                            .with_url(level_url.as_str())
                            .with_reason(e.to_string());
                            self.emit(EngineEvent::Error(error));
                            return;
                        }
                    }
                }
            };

            let frags = fragments(&playlist, &level_url);
            let refresh = Duration::from_secs(playlist.target_duration.max(1));
            let resume_from = next_sequence;
            let mut switched = false;

            for frag in frags
                .iter()
                .filter(|f| resume_from.is_none_or(|next| f.sequence >= next))
            {
                self.drain_commands();
                if self.target_level(levels.len()) != level_index {
                    switched = true;
                    break;
                }
                if !self
                    .load_fragment(level_index, frag, &mut loaded_key, &mut loaded_init)
                    .await
                {
                    return;
                }
                next_sequence = Some(frag.sequence + 1);
            }

            if switched {
                info!(
                    "Switching from level {} to level {}",
                    level_index,
                    self.target_level(levels.len())
                );
                continue;
            }
            if playlist.end_list {
                debug!("Reached end of presentation");
                return;
            }

            let refresh_timer = tokio::time::sleep(refresh);
            tokio::pin!(refresh_timer);
            loop {
                tokio::select! {
                    _ = &mut refresh_timer => break,
                    command = self.commands.recv() => match command {
                        Some(command) => {
                            let _ = self.apply(command);
                            if self.target_level(levels.len()) != level_index {
                                break;
                            }
                        }
                        None => return,
                    },
                }
            }
        }
    }

    /// `false` when the pipeline should stop
    async fn load_fragment(
        &mut self,
        level: usize,
        frag: &FragmentRef,
        loaded_key: &mut Option<Url>,
        loaded_init: &mut Option<(Url, Option<ByteRange>)>,
    ) -> bool {
        if let Some(key_url) = &frag.key_url
            && loaded_key.as_ref() != Some(key_url)
        {
            if self
                .load_until_ok(ResourceClass::Key, key_url, None)
                .await
                .is_none()
            {
                return false;
            }
            *loaded_key = Some(key_url.clone());
        }

        if let Some(init) = &frag.init
            && loaded_init.as_ref() != Some(init)
        {
            if self
                .load_until_ok(ResourceClass::Fragment, &init.0, init.1.as_ref())
                .await
                .is_none()
            {
                return false;
            }
            *loaded_init = Some(init.clone());
        }

        let Some(bytes) = self
            .load_until_ok(ResourceClass::Fragment, &frag.url, frag.byte_range.as_ref())
            .await
        else {
            return false;
        };

        // encrypted payloads cannot be sniffed
        if frag.key_url.is_none() && detect_format(&bytes) == FragmentFormat::Unknown {
            let error = EngineError::fatal(ErrorType::Media, ErrorDetails::FragParsingError)
                .with_url(frag.url.as_str())
                .with_reason("unrecognized fragment container");
            if !self.emit(EngineEvent::Error(error)) {
                return false;
            }
            return match self.wait_for_resume().await {
                Some(_) => {
                    debug!("Skipping fragment {}", frag.sequence);
                    true
                }
                None => false,
            };
        }

        self.emit(EngineEvent::FragmentLoaded {
            level,
            sequence: frag.sequence,
            bytes: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::subscription;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    const MASTER: &str = "#EXTM3U
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"English\",LANGUAGE=\"en\",DEFAULT=YES,URI=\"audio/en.m3u8\"
#EXT-X-STREAM-INF:BANDWIDTH=800000,AUDIO=\"aud\"
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2800000,AUDIO=\"aud\"
high/index.m3u8
";

    fn media(prefix: &str) -> String {
        format!(
            "#EXTM3U
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:6.0,
{prefix}0.ts
#EXTINF:6.0,
{prefix}1.ts
#EXT-X-ENDLIST
"
        )
    }

    const BASE: &str = "https://cdn.example/live/";

    fn ts_fragment() -> Bytes {
        let mut data = vec![0u8; 376];
        data[0] = 0x47;
        data[188] = 0x47;
        Bytes::from(data)
    }

    /// Responses per URL; the last one repeats
    #[derive(Default)]
    struct ScriptedLoader {
        responses: Mutex<HashMap<String, VecDeque<Result<Bytes, ErrorDetails>>>>,
    }

    impl ScriptedLoader {
        fn with(self, path: &str, responses: Vec<Result<Bytes, ErrorDetails>>) -> Self {
            self.responses
                .lock()
                .insert(format!("{BASE}{path}"), responses.into());
            self
        }

        fn vod() -> Self {
            Self::default()
                .with("master.m3u8", vec![Ok(Bytes::from(MASTER))])
                .with("low/index.m3u8", vec![Ok(Bytes::from(media("l")))])
                .with("high/index.m3u8", vec![Ok(Bytes::from(media("h")))])
                .with("low/l0.ts", vec![Ok(ts_fragment())])
                .with("low/l1.ts", vec![Ok(ts_fragment())])
                .with("high/h0.ts", vec![Ok(ts_fragment())])
                .with("high/h1.ts", vec![Ok(ts_fragment())])
        }
    }

    #[async_trait]
    impl ResourceLoader for ScriptedLoader {
        async fn load(
            &self,
            _class: ResourceClass,
            url: &Url,
            _byte_range: Option<&ByteRange>,
        ) -> Result<Bytes, EngineError> {
            let mut responses = self.responses.lock();
            let queue = responses
                .get_mut(url.as_str())
                .unwrap_or_else(|| panic!("unexpected request for {url}"));
            let response = if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap()
            };
            response.map_err(|details| {
                EngineError::fatal(ErrorType::Network, details).with_url(url.as_str())
            })
        }
    }

    fn engine(loader: ScriptedLoader) -> (HeadlessHlsEngine, crate::events::EventStream) {
        let (sink, stream) = subscription();
        let engine = HeadlessHlsEngine::with_loader(Arc::new(loader), sink, Handle::current());
        (engine, stream)
    }

    fn loaded(event: EngineEvent) -> (usize, u64) {
        match event {
            EngineEvent::FragmentLoaded {
                level, sequence, ..
            } => (level, sequence),
            other => panic!("expected FragmentLoaded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_walks_vod_presentation() {
        let (mut engine, mut events) = engine(ScriptedLoader::vod());
        engine.load_source(&format!("{BASE}master.m3u8"));

        match events.recv().await.unwrap() {
            EngineEvent::ManifestParsed { levels } => assert_eq!(levels.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        match events.recv().await.unwrap() {
            EngineEvent::AudioTracksUpdated { tracks } => {
                assert_eq!(tracks.len(), 1);
                assert_eq!(tracks[0].lang.as_deref(), Some("en"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(loaded(events.recv().await.unwrap()), (0, 0));
        assert_eq!(loaded(events.recv().await.unwrap()), (0, 1));
    }

    #[tokio::test]
    async fn test_requested_level_is_used_from_the_start() {
        let (mut engine, mut events) = engine(ScriptedLoader::vod());
        engine.set_current_level(1);
        engine.load_source(&format!("{BASE}master.m3u8"));

        let _manifest = events.recv().await.unwrap();
        let _audio = events.recv().await.unwrap();
        assert_eq!(loaded(events.recv().await.unwrap()), (1, 0));
        assert_eq!(loaded(events.recv().await.unwrap()), (1, 1));
    }

    #[tokio::test]
    async fn test_fragment_failure_parks_until_start_load() {
        let loader = ScriptedLoader::vod().with(
            "low/l0.ts",
            vec![Err(ErrorDetails::FragLoadError), Ok(ts_fragment())],
        );
        let (mut engine, mut events) = engine(loader);
        engine.load_source(&format!("{BASE}master.m3u8"));

        let _manifest = events.recv().await.unwrap();
        let _audio = events.recv().await.unwrap();
        match events.recv().await.unwrap() {
            EngineEvent::Error(error) => {
                assert!(error.fatal);
                assert_eq!(error.details, ErrorDetails::FragLoadError);
            }
            other => panic!("unexpected {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_err());

        engine.start_load();
        assert_eq!(loaded(events.recv().await.unwrap()), (0, 0));
    }

    #[tokio::test]
    async fn test_unrecognized_fragment_is_a_media_error() {
        let loader = ScriptedLoader::vod().with(
            "low/l0.ts",
            vec![Ok(Bytes::from_static(b"<html>502 Bad Gateway</html>"))],
        );
        let (mut engine, mut events) = engine(loader);
        engine.load_source(&format!("{BASE}master.m3u8"));

        let _manifest = events.recv().await.unwrap();
        let _audio = events.recv().await.unwrap();
        match events.recv().await.unwrap() {
            EngineEvent::Error(error) => {
                assert_eq!(error.kind, ErrorType::Media);
                assert_eq!(error.details, ErrorDetails::FragParsingError);
            }
            other => panic!("unexpected {other:?}"),
        }

        engine.recover_media_error();
        assert_eq!(loaded(events.recv().await.unwrap()), (0, 1));
    }

    #[tokio::test]
    async fn test_manifest_parse_failure() {
        let loader = ScriptedLoader::default()
            .with("master.m3u8", vec![Ok(Bytes::from_static(b"not a playlist"))]);
        let (mut engine, mut events) = engine(loader);
        engine.load_source(&format!("{BASE}master.m3u8"));

        match events.recv().await.unwrap() {
            EngineEvent::Error(error) => {
                assert_eq!(error.kind, ErrorType::Network);
                assert_eq!(error.details, ErrorDetails::ManifestParsingError);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_media_playlist_as_single_level() {
        let loader = ScriptedLoader::default()
            .with("master.m3u8", vec![Ok(Bytes::from(media("s")))])
            .with("s0.ts", vec![Ok(ts_fragment())])
            .with("s1.ts", vec![Ok(ts_fragment())]);
        let (mut engine, mut events) = engine(loader);
        engine.load_source(&format!("{BASE}master.m3u8"));

        match events.recv().await.unwrap() {
            EngineEvent::ManifestParsed { levels } => {
                assert_eq!(levels.len(), 1);
                assert_eq!(levels[0].url, format!("{BASE}master.m3u8"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let _audio = events.recv().await.unwrap();
        assert_eq!(loaded(events.recv().await.unwrap()), (0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_playlist_refresh_skips_seen_fragments() {
        let window = |first: u64| {
            Bytes::from(format!(
                "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:{first}
#EXTINF:4.0,
live{first}.ts
#EXTINF:4.0,
live{}.ts
",
                first + 1
            ))
        };
        let loader = ScriptedLoader::default()
            .with("master.m3u8", vec![Ok(window(0)), Ok(window(1))])
            .with("live0.ts", vec![Ok(ts_fragment())])
            .with("live1.ts", vec![Ok(ts_fragment())])
            .with("live2.ts", vec![Ok(ts_fragment())]);
        let (mut engine, mut events) = engine(loader);
        engine.load_source(&format!("{BASE}master.m3u8"));

        let _manifest = events.recv().await.unwrap();
        let _audio = events.recv().await.unwrap();
        assert_eq!(loaded(events.recv().await.unwrap()), (0, 0));
        assert_eq!(loaded(events.recv().await.unwrap()), (0, 1));
        // after one target duration the refreshed window only adds live2
        assert_eq!(loaded(events.recv().await.unwrap()), (0, 2));
    }

    #[tokio::test]
    async fn test_destroy_closes_the_subscription() {
        let loader = ScriptedLoader::vod().with(
            "low/l0.ts",
            vec![Err(ErrorDetails::FragLoadTimeout)],
        );
        let (mut engine, mut events) = engine(loader);
        engine.load_source(&format!("{BASE}master.m3u8"));
        let _manifest = events.recv().await.unwrap();
        let _audio = events.recv().await.unwrap();
        let _error = events.recv().await.unwrap();

        engine.destroy();
        drop(engine);
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_url_is_reported() {
        let (mut engine, mut events) = engine(ScriptedLoader::default());
        engine.load_source("not a url");
        match events.recv().await.unwrap() {
            EngineEvent::Error(error) => {
                assert_eq!(error.details, ErrorDetails::ManifestLoadError)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_factory_needs_a_runtime() {
        let factory = HeadlessHlsFactory::new(Client::new());
        assert!(!factory.is_supported());
        let (sink, _stream) = subscription();
        assert!(factory.create(&EngineConfig::default(), sink).is_err());
    }
}
