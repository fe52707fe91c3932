// Error type shared by session setup, endpoint resolution and the headless engine
#[derive(Debug, thiserror::Error)]
pub enum PlaygateError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid proxy configuration: {0}")]
    ProxyError(String),

    #[error("No playback path for source: {0}")]
    NoPlaybackPath(String),

    #[error("Playback engine error: {0}")]
    EngineError(String),

    #[error("Playlist error: {0}")]
    PlaylistError(String),
}
