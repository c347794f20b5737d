//! Remote and distribution configuration entities

use crate::RepositoryId;
use depot_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

/// How a remote's content is brought into the mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorPolicy {
    /// Eagerly sync every unit the upstream index lists
    FullSync,
    /// Fetch a unit the first time it is requested, cache thereafter
    OnDemand,
}

/// Configured pointer to an upstream artifact repository.
///
/// Immutable after creation except for policy toggling. Deleting a remote
/// orphans its catalog entries; shared store blobs survive until the last
/// referencing repository releases them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remote {
    pub id: Uuid,
    pub name: String,
    pub base_url: Url,
    pub policy: MirrorPolicy,
}

impl Remote {
    /// Create a remote pointing at an upstream repository root
    ///
    /// # Errors
    /// Returns an error if `base_url` is not a valid absolute URL.
    pub fn new(name: impl Into<String>, base_url: &str, policy: MirrorPolicy) -> Result<Self, Error> {
        let base_url = Url::parse(base_url).map_err(|e| ConfigError::InvalidValue {
            field: "base_url".to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            base_url,
            policy,
        })
    }

    /// The repository this remote mirrors into
    #[must_use]
    pub fn repository_id(&self) -> RepositoryId {
        RepositoryId(self.id)
    }
}

/// The locally served view of a repository, reachable at a base path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    pub id: Uuid,
    pub base_path: String,
    pub repository_id: RepositoryId,
    /// Set when the backing remote uses the on-demand policy; serve-time
    /// misses delegate a single fetch through it.
    pub remote: Option<Remote>,
}

impl Distribution {
    #[must_use]
    pub fn new(base_path: impl Into<String>, repository_id: RepositoryId) -> Self {
        let base_path = base_path.into();
        Self {
            id: Uuid::new_v4(),
            base_path: base_path.trim_matches('/').to_string(),
            repository_id,
            remote: None,
        }
    }

    #[must_use]
    pub fn with_remote(mut self, remote: Remote) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Externally visible URL of this distribution under a server root
    #[must_use]
    pub fn base_url(&self, server_root: &str) -> String {
        format!("{}/{}/", server_root.trim_end_matches('/'), self.base_path)
    }

    /// Strip the base path prefix from an incoming request path, yielding
    /// the repository-relative path, or None if the prefix does not match.
    ///
    /// The match is segment-aware: the base path must be followed by a
    /// path separator, so `maven/maven` never claims `/maven/mavenx/...`.
    #[must_use]
    pub fn relative_path<'a>(&self, request_path: &'a str) -> Option<&'a str> {
        let path = request_path.trim_start_matches('/');
        let rest = path.strip_prefix(&self.base_path)?;
        let rest = rest.strip_prefix('/')?;
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}
