/// Result alias over [`MetronomeError`].
pub type Result<T> = std::result::Result<T, MetronomeError>;

#[derive(Debug, thiserror::Error)]
pub enum MetronomeError {
    /// The clock source backing the scheduler cannot be read, e.g. because the
    /// audio device behind it has been closed.
    #[error("metronome engine not ready: {0}")]
    EngineNotReady(String),
    /// A configuration value falls outside the supported set.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON configuration.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl MetronomeError {
    pub fn not_ready<T: Into<String>>(reason: T) -> Self {
        Self::EngineNotReady(reason.into())
    }

    pub fn invalid<T: Into<String>>(reason: T) -> Self {
        Self::InvalidConfiguration(reason.into())
    }
}
