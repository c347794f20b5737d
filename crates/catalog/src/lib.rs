#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Unit catalog for the depot mirror engine
//!
//! Maps (repository, relative path) to a verified content unit. The index
//! is the path-naming layer over the content-addressed store: paths stay
//! stable across syncs while the store key underneath is derived from the
//! bytes. Registration is a conditional insert; a path can never silently
//! change identity.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use depot_errors::{CatalogError, Error};
use depot_hash::Digest;
use depot_types::{ContentUnit, RepositoryId, StoreKey};
use std::sync::Arc;
use tracing::warn;

/// Outcome of a registration attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The path was not yet cataloged; a new unit was inserted
    Added(ContentUnit),
    /// The path was already cataloged with the same digest; no change
    Unchanged(ContentUnit),
}

impl Registration {
    #[must_use]
    pub fn unit(&self) -> &ContentUnit {
        match self {
            Self::Added(unit) | Self::Unchanged(unit) => unit,
        }
    }
}

/// Path index over verified content units
#[derive(Clone, Default)]
pub struct UnitCatalog {
    index: Arc<DashMap<(RepositoryId, String), ContentUnit>>,
}

impl UnitCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Conditionally register a unit under (repository, relative path).
    ///
    /// Idempotent for an unchanged digest. If the path is already
    /// registered with a different digest, registration fails with
    /// `DigestConflict`: upstream content must not mutate under a stable
    /// path. The insert is linearizable per path; concurrent syncs of the
    /// same repository cannot interleave conflicting registrations.
    ///
    /// # Errors
    /// Returns `CatalogError::DigestConflict` as described above.
    pub fn register(
        &self,
        repository_id: RepositoryId,
        relative_path: &str,
        digest: Digest,
        store_key: StoreKey,
        size: u64,
    ) -> Result<Registration, Error> {
        match self
            .index
            .entry((repository_id, relative_path.to_string()))
        {
            Entry::Vacant(vacant) => {
                let unit = ContentUnit {
                    relative_path: relative_path.to_string(),
                    digest,
                    size,
                    store_key,
                };
                vacant.insert(unit.clone());
                Ok(Registration::Added(unit))
            }
            Entry::Occupied(occupied) => {
                let existing = occupied.get();
                if existing.digest == digest {
                    Ok(Registration::Unchanged(existing.clone()))
                } else {
                    warn!(
                        repository = %repository_id,
                        relative_path,
                        "refusing registration: upstream path changed identity"
                    );
                    Err(CatalogError::DigestConflict {
                        relative_path: relative_path.to_string(),
                        existing: existing.digest.to_string(),
                        incoming: digest.to_string(),
                    }
                    .into())
                }
            }
        }
    }

    /// Look up a unit by repository and relative path
    ///
    /// # Errors
    /// Returns `CatalogError::UnitNotFound` on a miss.
    pub fn resolve(
        &self,
        repository_id: RepositoryId,
        relative_path: &str,
    ) -> Result<ContentUnit, Error> {
        self.index
            .get(&(repository_id, relative_path.to_string()))
            .map(|entry| entry.clone())
            .ok_or_else(|| {
                CatalogError::UnitNotFound {
                    repository_id: repository_id.to_string(),
                    relative_path: relative_path.to_string(),
                }
                .into()
            })
    }

    /// Whether a path is already satisfied in this repository
    #[must_use]
    pub fn contains(&self, repository_id: RepositoryId, relative_path: &str) -> bool {
        self.index
            .contains_key(&(repository_id, relative_path.to_string()))
    }

    /// All units of one repository, in unspecified order
    #[must_use]
    pub fn snapshot(&self, repository_id: RepositoryId) -> Vec<ContentUnit> {
        self.index
            .iter()
            .filter(|entry| entry.key().0 == repository_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Units whose final path component equals `filename`, across all
    /// repositories
    #[must_use]
    pub fn units_by_filename(&self, filename: &str) -> Vec<ContentUnit> {
        self.index
            .iter()
            .filter(|entry| entry.value().filename() == filename)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Drop every entry of a repository, returning the orphaned units so
    /// the caller can release their store references. Blobs shared with
    /// other repositories survive; the store deletes bytes only at ref
    /// zero.
    pub fn forget_repository(&self, repository_id: RepositoryId) -> Vec<ContentUnit> {
        let paths: Vec<_> = self
            .index
            .iter()
            .filter(|entry| entry.key().0 == repository_id)
            .map(|entry| entry.key().clone())
            .collect();

        paths
            .into_iter()
            .filter_map(|key| self.index.remove(&key).map(|(_, unit)| unit))
            .collect()
    }

    /// Total number of cataloged units
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
