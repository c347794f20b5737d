#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Content-addressed storage for the depot mirror engine
//!
//! Verified payloads live under `objects/<2-char>/<rest>` keyed by their
//! own SHA-256 hex. Identical payloads across repositories share one blob;
//! a per-key reference count tracks how many catalog units point at it and
//! the blob is deleted only when the count reaches zero.

mod staged;

pub use staged::StagedBlob;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use depot_errors::{Error, StorageError};
use depot_hash::content_path;
use depot_types::StoreKey;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

/// Content-addressed blob store with reference counting
#[derive(Clone)]
pub struct ContentStore {
    objects_path: PathBuf,
    ref_counts: Arc<DashMap<String, u64>>,
}

impl ContentStore {
    /// Create a store rooted at `base_path`; blobs live in `objects/`
    #[must_use]
    pub fn new(base_path: &Path) -> Self {
        Self {
            objects_path: base_path.join("objects"),
            ref_counts: Arc::new(DashMap::new()),
        }
    }

    /// Create the objects directory
    ///
    /// # Errors
    /// Returns an error if directory creation fails.
    pub async fn init(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.objects_path).await?;
        Ok(())
    }

    /// Filesystem path for a store key
    ///
    /// # Errors
    /// Returns `StorageError::InvalidKey` unless the key is a 64-char
    /// SHA-256 hex string; anything else could escape the objects tree.
    pub fn blob_path(&self, key: &StoreKey) -> Result<PathBuf, Error> {
        if key.0.len() != 64 || !key.0.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidKey {
                key: key.0.clone(),
            }
            .into());
        }
        Ok(self.objects_path.join(content_path(&key.0)))
    }

    /// Open a staging area for an incoming payload.
    ///
    /// Bytes written to the staged blob are hashed as they arrive; nothing
    /// becomes visible in the store until [`StagedBlob::commit`].
    ///
    /// # Errors
    /// Returns an error if the temp file cannot be created.
    pub async fn stage(&self) -> Result<StagedBlob, Error> {
        StagedBlob::create(self.clone()).await
    }

    /// Store a payload, returning its content-derived key.
    ///
    /// Idempotent per distinct payload modulo ref-count bookkeeping: a
    /// second `put` of identical bytes reuses the blob and increments the
    /// reference count.
    ///
    /// # Errors
    /// Returns an error if file I/O fails.
    pub async fn put(&self, data: &[u8]) -> Result<StoreKey, Error> {
        let mut staged = self.stage().await?;
        staged.write(data).await?;
        let (key, _) = staged.commit().await?;
        Ok(key)
    }

    /// Read a stored payload into memory
    ///
    /// # Errors
    /// Returns `StorageError::NotPresent` if the blob was evicted or never
    /// stored.
    pub async fn get(&self, key: &StoreKey) -> Result<Bytes, Error> {
        let path = self.blob_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotPresent {
                    key: key.0.clone(),
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a stored payload for streaming, with its byte length
    ///
    /// # Errors
    /// Returns `StorageError::NotPresent` if the blob is missing.
    pub async fn open(&self, key: &StoreKey) -> Result<(fs::File, u64), Error> {
        let path = self.blob_path(key)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotPresent {
                    key: key.0.clone(),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// Whether a blob is present
    pub async fn contains(&self, key: &StoreKey) -> bool {
        match self.blob_path(key) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Current reference count for a key (zero if unknown)
    #[must_use]
    pub fn ref_count(&self, key: &StoreKey) -> u64 {
        self.ref_counts.get(&key.0).map_or(0, |count| *count)
    }

    /// Drop one reference; deletes the blob when the count reaches zero.
    ///
    /// Returns true if the underlying bytes were deleted.
    ///
    /// # Errors
    /// Returns `StorageError::NotPresent` if the key holds no references,
    /// or an I/O error if blob removal fails.
    pub fn release(&self, key: &StoreKey) -> Result<bool, Error> {
        let path = self.blob_path(key)?;
        match self.ref_counts.entry(key.0.clone()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > 1 {
                    *occupied.get_mut() -= 1;
                    return Ok(false);
                }

                debug!(key = %key, "last reference released, deleting blob");
                // Unlink while the entry is held; a commit of the same key
                // cannot land between the zero decision and the delete
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    // Already gone; the bookkeeping is what matters
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                occupied.remove();
                Ok(true)
            }
            Entry::Vacant(_) => Err(StorageError::NotPresent {
                key: key.0.clone(),
            }
            .into()),
        }
    }

    /// Move a committed temp file into its addressed location and take a
    /// reference, atomically with respect to [`release`](Self::release) of
    /// the same key.
    pub(crate) fn land(&self, temp_path: &Path, key: &StoreKey) -> Result<(), Error> {
        let dest_path = self.blob_path(key)?;
        let parent = dest_path.parent().ok_or_else(|| StorageError::IoError {
            message: "blob path has no parent".to_string(),
        })?;
        std::fs::create_dir_all(parent).map_err(StorageError::from)?;

        // Rename under the key's map entry so a concurrent zero-release
        // cannot unlink the freshly landed bytes before they are counted
        let entry = self.ref_counts.entry(key.0.clone());
        match std::fs::rename(temp_path, &dest_path) {
            Ok(()) => {}
            // Another writer landed the same content first; not an error,
            // the bytes are identical by construction.
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let _ = std::fs::remove_file(temp_path);
            }
            Err(e) => {
                drop(entry);
                let _ = std::fs::remove_file(temp_path);
                return Err(StorageError::AtomicRenameFailed {
                    message: format!("{}: {e}", dest_path.display()),
                }
                .into());
            }
        }
        *entry.or_insert(0) += 1;
        Ok(())
    }

    pub(crate) fn objects_path(&self) -> &Path {
        &self.objects_path
    }
}

#[cfg(test)]
mod tests;
