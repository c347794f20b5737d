//! Manifest-file index
//!
//! A depot manifest is a text file at a well-known path under the remote
//! root, one unit per line:
//!
//! ```text
//! # comment
//! sha256:9f86d081884c7d65...  custommatcher/1.0/custommatcher-1.0.jar
//! sha1:2aae6c35c94fcfb4...    custommatcher/1.0/custommatcher-1.0.jar.sha1
//! ```

use crate::index::{IndexEntry, RepositoryIndex};
use depot_errors::{Error, Result, SyncError};
use depot_hash::Digest;
use depot_net::Fetcher;
use futures::future::BoxFuture;
use url::Url;

/// Default manifest location under the remote root
pub const DEFAULT_MANIFEST_PATH: &str = ".depot-manifest";

/// Index backed by a manifest file fetched from the remote
#[derive(Clone)]
pub struct ManifestIndex {
    fetcher: Fetcher,
    base_url: Url,
    manifest_path: String,
}

impl ManifestIndex {
    #[must_use]
    pub fn new(fetcher: Fetcher, base_url: Url) -> Self {
        Self {
            fetcher,
            base_url,
            manifest_path: DEFAULT_MANIFEST_PATH.to_string(),
        }
    }

    #[must_use]
    pub fn with_manifest_path(mut self, path: impl Into<String>) -> Self {
        self.manifest_path = path.into();
        self
    }
}

impl RepositoryIndex for ManifestIndex {
    fn list(&self) -> BoxFuture<'_, Result<Vec<IndexEntry>>> {
        Box::pin(async move {
            let bytes = self
                .fetcher
                .fetch(&self.base_url, &self.manifest_path)
                .await
                .map_err(|e| SyncError::IndexUnavailable {
                    message: e.to_string(),
                })?;

            let text = std::str::from_utf8(&bytes).map_err(|e| SyncError::MalformedIndex {
                message: format!("manifest is not UTF-8: {e}"),
            })?;

            parse_manifest(text)
        })
    }
}

/// Parse manifest text into index entries
///
/// # Errors
/// Returns `SyncError::MalformedIndex` on a line that is not
/// `<algorithm>:<hex>  <relative_path>`.
pub fn parse_manifest(text: &str) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (digest, path) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| malformed(lineno, "missing path column"))?;

        let digest = Digest::parse(digest).map_err(|e| malformed(lineno, &e.to_string()))?;
        let relative_path = path.trim();
        if relative_path.is_empty() {
            return Err(malformed(lineno, "empty path"));
        }

        entries.push(IndexEntry {
            relative_path: relative_path.to_string(),
            digest,
        });
    }

    Ok(entries)
}

fn malformed(lineno: usize, message: &str) -> Error {
    SyncError::MalformedIndex {
        message: format!("line {}: {message}", lineno + 1),
    }
    .into()
}
