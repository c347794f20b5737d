#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the depot mirror engine
//!
//! This crate provides fine-grained error types organized by domain.
//! Per-unit sync failures are recoverable and get collected into sync
//! results; catalog/store consistency failures propagate as fatal.

use thiserror::Error;

pub mod catalog;
pub mod config;
pub mod network;
pub mod storage;
pub mod sync;

// Re-export all error types at the root
pub use catalog::CatalogError;
pub use config::ConfigError;
pub use network::FetchError;
pub use storage::StorageError;
pub use sync::SyncError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for depot operations
pub type Result<T> = std::result::Result<T, Error>;
