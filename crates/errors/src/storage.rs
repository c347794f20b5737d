//! Content store error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The catalog references a key the store no longer holds. This is a
    /// consistency violation, not a cache miss; callers must treat it as
    /// fatal for the affected unit rather than reporting not-found.
    #[error("store entry not present: {key}")]
    NotPresent { key: String },

    #[error("corrupted data: {message}")]
    CorruptedData { message: String },

    #[error("invalid store key: {key}")]
    InvalidKey { key: String },

    #[error("atomic rename failed: {message}")]
    AtomicRenameFailed { message: String },

    #[error("IO error: {message}")]
    IoError { message: String },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            message: err.to_string(),
        }
    }
}
