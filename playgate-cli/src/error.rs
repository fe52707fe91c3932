use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Playback error: {0}")]
    Playback(#[from] playgate_engine::PlaygateError),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("All {0} servers failed")]
    AllServersFailed(usize),
}
