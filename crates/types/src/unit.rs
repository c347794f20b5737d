//! Content units and sync reporting

use depot_hash::Digest;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one mirrored repository's namespace in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId(pub Uuid);

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content store key: the SHA-256 hex of the stored payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey(pub String);

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One artifact within a repository snapshot.
///
/// Immutable once verified; the declared digest is authoritative and the
/// stored bytes must always re-verify against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUnit {
    pub relative_path: String,
    pub digest: Digest,
    pub size: u64,
    pub store_key: StoreKey,
}

impl ContentUnit {
    /// Final path component, used for filename-based catalog queries
    #[must_use]
    pub fn filename(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

/// One unit that failed during a sync pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFailure {
    pub relative_path: String,
    pub error: String,
}

/// Summary of one sync invocation.
///
/// Ephemeral: produced per invocation and consumed by the caller. A run
/// with zero additions but nonzero failures is degraded, not a total
/// failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResult {
    /// Units fetched, verified, and newly registered
    pub units_added: u64,
    /// Units already present whose registration re-verified as identical
    pub units_verified: u64,
    /// Units that failed fetch, verification, or registration
    pub units_failed: u64,
    /// Per-unit failure descriptions in discovery order
    pub errors: Vec<SyncFailure>,
}

impl SyncResult {
    pub fn record_failure(&mut self, relative_path: impl Into<String>, error: impl fmt::Display) {
        self.units_failed += 1;
        self.errors.push(SyncFailure {
            relative_path: relative_path.into(),
            error: error.to_string(),
        });
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.units_failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_hash::{Digest, DigestAlgorithm};

    #[test]
    fn filename_is_last_component() {
        let digest = Digest::compute(DigestAlgorithm::Sha256, b"x");
        let unit = ContentUnit {
            relative_path: "custommatcher/1.0/custommatcher-1.0-javadoc.jar.sha1".to_string(),
            store_key: StoreKey(digest.to_hex()),
            digest,
            size: 1,
        };
        assert_eq!(unit.filename(), "custommatcher-1.0-javadoc.jar.sha1");
    }

    #[test]
    fn sync_result_collects_failures_in_order() {
        let mut result = SyncResult::default();
        result.record_failure("a/1.jar", "digest mismatch");
        result.record_failure("b/2.jar", "not found upstream");

        assert_eq!(result.units_failed, 2);
        assert!(result.is_degraded());
        assert_eq!(result.errors[0].relative_path, "a/1.jar");
        assert_eq!(result.errors[1].relative_path, "b/2.jar");
    }
}
