//! # Registry Errors

use thiserror::Error;

use crate::merge::MergeError;

/// Result type for persistence operations
pub type PersistResult<T> = Result<T, PersistError>;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage failures
#[derive(Debug, Clone, Error)]
pub enum PersistError {
    #[error("I/O error at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to encode registry state: {0}")]
    Encode(String),

    #[error("Corrupt registry state at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Persistence unavailable: {0}")]
    Unavailable(String),
}

impl PersistError {
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        PersistError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    pub fn corrupt(path: &std::path::Path, reason: impl Into<String>) -> Self {
        PersistError::Corrupt {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PersistError::Io { .. } => "PERSIST_IO",
            PersistError::Encode(_) => "PERSIST_ENCODE",
            PersistError::Corrupt { .. } => "PERSIST_CORRUPT",
            PersistError::Unavailable(_) => "PERSIST_UNAVAILABLE",
        }
    }
}

/// Failures of a store operation as a whole
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Batch of {count} records exceeds the maximum of {max}")]
    BatchTooLarge { count: usize, max: usize },

    #[error("Commit failed: {0}")]
    Persist(#[from] PersistError),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

impl From<MergeError> for StoreError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::BatchTooLarge { count, max } => StoreError::BatchTooLarge { count, max },
        }
    }
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
            StoreError::Persist(_) => "COMMIT_FAILED",
            StoreError::Unavailable(_) => "UNAVAILABLE",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::BatchTooLarge { .. } => 413,
            StoreError::Persist(_) => 500,
            StoreError::Unavailable(_) => 503,
        }
    }

    /// Message safe to hand to clients; storage detail stays in the logs
    pub fn public_message(&self) -> String {
        match self {
            StoreError::BatchTooLarge { .. } => self.to_string(),
            StoreError::Persist(_) => "Registry commit failed".to_string(),
            StoreError::Unavailable(_) => "Registry temporarily unavailable".to_string(),
        }
    }
}
