#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Shared types for the depot mirror engine

mod remote;
mod unit;

pub use remote::{Distribution, MirrorPolicy, Remote};
pub use unit::{ContentUnit, RepositoryId, StoreKey, SyncFailure, SyncResult};
