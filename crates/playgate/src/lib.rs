//! # Playgate
//!
//! Client-side playback supervision for media delivered through a pool of
//! interchangeable servers and delivery proxies.
//!
//! ## Features
//!
//! - Stream sessions that attach a source, watch the engine and fail over
//! - Failure classification with bounded fragment retry and media recovery
//! - Quality and audio-track selection
//! - Sequential endpoint probing with a per-probe timeout
//! - Server bookkeeping with per-server status
//! - A headless HLS engine for hosts without a native player

pub mod builder;
pub mod classify;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod hls;
pub mod resolver;
pub mod session;
pub mod source;
pub mod tracks;
pub mod transport;

pub use builder::{HttpConfigBuilder, SessionConfigBuilder};
pub use config::{
    DEFAULT_AUDIO_LANGUAGE, DEFAULT_PROXY_QUERY_PARAM, EngineConfig, HttpConfig, OutboundProxy,
    ProxyAuth, ProxyConfig, ProxyScheme, ResolverConfig, SessionConfig,
};
pub use error::PlaygateError;

pub use client::create_client;

pub use source::{DeliveryKind, Server, ServerManager, ServerStatus, Source};

// Endpoint resolution
pub use resolver::{EndpointProbeResult, EndpointResolver, proxied_url};
pub use transport::{HttpProbeTransport, ProbeError, ProbeTransport};

// Session and the engine capability it drives
pub use classify::{FailureClass, classify};
pub use engine::{EngineFactory, HLS_MIME_TYPE, MediaSurface, PlayError, PlaybackEngine};
pub use events::{
    EngineError, EngineEvent, EngineListener, ErrorDetails, ErrorType, EventSink, EventStream,
};
pub use session::{PlaybackPath, SessionState, StatusCallback, StreamSession};
pub use tracks::{AUTO_QUALITY, AudioTrack, QualityLevel, select_audio_track};

pub use hls::{HeadlessHlsEngine, HeadlessHlsFactory};
