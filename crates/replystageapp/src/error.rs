use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Corrupt metadata at {}: {reason}", path.display())]
    CorruptMetadata { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Enumeration cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Staged file not found: {0}")]
    NotFound(Uuid),
}

impl StageError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StageError::CorruptMetadata {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StageError>;
