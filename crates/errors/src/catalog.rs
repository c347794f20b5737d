//! Unit catalog error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("no unit at {relative_path} in repository {repository_id}")]
    UnitNotFound {
        repository_id: String,
        relative_path: String,
    },

    /// Registration was refused because the path already maps to content
    /// with a different digest. Upstream mutated a stable path; surfaced
    /// to the operator instead of silently overwriting.
    #[error(
        "digest conflict at {relative_path}: registered {existing}, upstream now reports {incoming}"
    )]
    DigestConflict {
        relative_path: String,
        existing: String,
        incoming: String,
    },

    #[error("unknown repository: {repository_id}")]
    UnknownRepository { repository_id: String },
}
