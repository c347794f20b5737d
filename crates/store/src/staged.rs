//! Staged blob writes
//!
//! Payloads are written to a uniquely named temp file and hashed as they
//! arrive, then moved into their content-addressed location with an atomic
//! rename. A blob that loses the rename race to a concurrent writer of the
//! same content is not an error: the surviving bytes are identical.

use crate::ContentStore;
use depot_errors::Error;
use depot_hash::{DigestAlgorithm, StreamHasher};
use depot_types::StoreKey;
use std::path::PathBuf;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// An in-flight payload not yet visible in the store
pub struct StagedBlob {
    store: ContentStore,
    temp_path: PathBuf,
    file: Option<File>,
    hasher: Option<StreamHasher>,
    len: u64,
}

impl StagedBlob {
    pub(crate) async fn create(store: ContentStore) -> Result<Self, Error> {
        fs::create_dir_all(store.objects_path()).await?;
        let temp_path = store.objects_path().join(format!("{}.tmp", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;

        Ok(Self {
            store,
            temp_path,
            file: Some(file),
            hasher: Some(StreamHasher::new(DigestAlgorithm::Sha256)),
            len: 0,
        })
    }

    /// Append a chunk of the payload
    ///
    /// # Errors
    /// Returns an error if writing the temp file fails.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), Error> {
        let file = self.file.as_mut().ok_or_else(|| {
            Error::internal("staged blob already consumed")
        })?;
        file.write_all(chunk).await?;
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(chunk);
        }
        self.len += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Make the payload visible under its content-derived key.
    ///
    /// Increments the key's reference count whether or not the blob was
    /// newly written.
    ///
    /// # Errors
    /// Returns an error if flushing or the atomic rename fails.
    pub async fn commit(mut self) -> Result<(StoreKey, u64), Error> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| Error::internal("staged blob already consumed"))?;
        file.flush().await?;
        drop(file);

        let hasher = self
            .hasher
            .take()
            .ok_or_else(|| Error::internal("staged blob already consumed"))?;
        let key = StoreKey(hasher.finalize().to_hex());

        self.store.land(&self.temp_path, &key)?;
        Ok((key, self.len))
    }

    /// Abandon the payload and remove the temp file
    pub async fn discard(mut self) {
        self.file.take();
        self.hasher.take();
        let _ = fs::remove_file(&self.temp_path).await;
    }
}

impl Drop for StagedBlob {
    fn drop(&mut self) {
        // Best-effort cleanup for abandoned stages
        if self.file.is_some() {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}
