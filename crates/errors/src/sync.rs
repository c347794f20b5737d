//! Sync orchestration error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("digest mismatch for {relative_path}: expected {expected}, got {actual}")]
    DigestMismatch {
        relative_path: String,
        expected: String,
        actual: String,
    },

    #[error("failed to list upstream index: {message}")]
    IndexUnavailable { message: String },

    #[error("malformed index entry: {message}")]
    MalformedIndex { message: String },

    #[error("unknown remote: {remote_id}")]
    UnknownRemote { remote_id: String },

    #[error("sync worker unavailable")]
    WorkerGone,
}
