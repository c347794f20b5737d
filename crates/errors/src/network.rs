//! Upstream fetch error types

use thiserror::Error;

/// Errors from retrieving content from an upstream repository.
///
/// The three-way split drives retry policy: only `Transient` failures are
/// eligible for backoff-and-retry; `NotFound` and `Permanent` propagate
/// immediately.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("not found upstream: {url}")]
    NotFound { url: String },

    #[error("transient fetch failure for {url}: {message}")]
    Transient { url: String, message: String },

    #[error("permanent fetch failure for {url}: {message}")]
    Permanent { url: String, message: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("payload exceeds size limit: {url} ({bytes} bytes)")]
    TooLarge { url: String, bytes: u64 },
}

impl FetchError {
    /// Whether retrying the same fetch is likely to succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}
