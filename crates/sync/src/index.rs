//! Pluggable upstream index discovery
//!
//! How a repository enumerates its content is upstream-specific (Maven
//! checksum sidecars, flat manifests, API listings). The orchestrator only
//! needs path → declared-digest pairs, so discovery sits behind a trait.

use depot_errors::Result;
use depot_hash::Digest;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// One discoverable unit: a repository-relative path and the digest the
/// upstream declares for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub relative_path: String,
    pub digest: Digest,
}

/// Enumerates the content units an upstream repository exposes
pub trait RepositoryIndex: Send + Sync {
    /// List every unit with its declared digest
    fn list(&self) -> BoxFuture<'_, Result<Vec<IndexEntry>>>;

    /// Look up a single path's declared digest.
    ///
    /// The default scans the full listing; implementations with random
    /// access (for example checksum sidecar files) can do better.
    fn entry<'a>(&'a self, relative_path: &'a str) -> BoxFuture<'a, Result<Option<IndexEntry>>> {
        Box::pin(async move {
            Ok(self
                .list()
                .await?
                .into_iter()
                .find(|entry| entry.relative_path == relative_path))
        })
    }
}

/// Fixed in-memory index, for tests and embedded repositories
#[derive(Debug, Clone, Default)]
pub struct StaticIndex {
    entries: Vec<IndexEntry>,
}

impl StaticIndex {
    #[must_use]
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }
}

impl RepositoryIndex for StaticIndex {
    fn list(&self) -> BoxFuture<'_, Result<Vec<IndexEntry>>> {
        Box::pin(async move { Ok(self.entries.clone()) })
    }
}
