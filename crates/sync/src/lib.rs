#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Sync orchestration for the depot mirror engine
//!
//! Walks a remote repository's index, fetches units that are not yet
//! satisfied, verifies each payload against its declared digest, persists
//! verified bytes in the content store, and records them in the unit
//! catalog. One failed unit never blocks the rest of a sync pass.
//!
//! Also hosts the on-demand path (fetch a single unit the first time it is
//! requested, with per-path request coalescing) and the `MirrorService`
//! boundary the host framework drives.

mod index;
mod manifest;
mod orchestrator;
mod service;

pub use index::{IndexEntry, RepositoryIndex, StaticIndex};
pub use manifest::{ManifestIndex, DEFAULT_MANIFEST_PATH};
pub use orchestrator::SyncOrchestrator;
pub use service::MirrorService;
