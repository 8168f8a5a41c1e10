use thiserror::Error;

#[derive(Error, Debug)]
pub enum GmError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Summarization failed: {0}")]
    Summarization(String),
    #[error("Completion failed: {0}")]
    Completion(String),
    #[error("Completion cancelled")]
    Cancelled,
    #[error("Corrupt persisted state: {0}")]
    Corrupt(String),
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },
    #[error("Persisted state has not been loaded yet")]
    NotHydrated,
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GmError {
    /// Whether the error came from one of the model calls and leaves the
    /// running session usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GmError::Summarization(_) | GmError::Completion(_) | GmError::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, GmError>;
