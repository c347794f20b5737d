#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Cryptographic digests for content addressing and integrity verification
//!
//! Store keys are SHA-256 hex strings; upstream repositories additionally
//! declare SHA-1 and MD5 checksums, so verification speaks all three.
//! Verification fails closed: a mismatch, truncated payload, or unknown
//! algorithm is never treated as valid.

mod hasher;

pub use hasher::StreamHasher;

use depot_errors::{Error, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Size of chunks for streaming hash computation
const CHUNK_SIZE: usize = 64 * 1024; // 64KB

/// Digest algorithms understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha256,
    Sha1,
    Md5,
}

impl DigestAlgorithm {
    /// Digest length in bytes
    #[must_use]
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha1 => 20,
            Self::Md5 => 16,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
            Self::Md5 => "md5",
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha1" => Ok(Self::Sha1),
            "md5" => Ok(Self::Md5),
            other => Err(StorageError::CorruptedData {
                message: format!("unsupported digest algorithm: {other}"),
            }
            .into()),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A digest value paired with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    bytes: Vec<u8>,
}

impl Digest {
    /// Compute the digest of a byte slice
    #[must_use]
    pub fn compute(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        let mut hasher = StreamHasher::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }

    /// Construct from raw digest bytes
    pub(crate) fn from_raw(algorithm: DigestAlgorithm, bytes: Vec<u8>) -> Self {
        debug_assert_eq!(bytes.len(), algorithm.digest_len());
        Self { algorithm, bytes }
    }

    /// Parse from a hex string
    ///
    /// # Errors
    /// Returns an error if the input is not valid hex or has the wrong
    /// length for the algorithm.
    pub fn from_hex(algorithm: DigestAlgorithm, s: &str) -> Result<Self, Error> {
        let bytes = hex::decode(s).map_err(|e| StorageError::CorruptedData {
            message: format!("invalid hex: {e}"),
        })?;

        if bytes.len() != algorithm.digest_len() {
            return Err(StorageError::CorruptedData {
                message: format!(
                    "{algorithm} digest must be {} bytes, got {}",
                    algorithm.digest_len(),
                    bytes.len()
                ),
            }
            .into());
        }

        Ok(Self { algorithm, bytes })
    }

    /// Parse a `algorithm:hex` pair, e.g. `sha256:ab12...`
    ///
    /// # Errors
    /// Returns an error on a missing separator, unknown algorithm, or
    /// malformed hex value.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let (algo, hex_value) = s.split_once(':').ok_or_else(|| StorageError::CorruptedData {
            message: format!("digest must be 'algorithm:hex', got {s:?}"),
        })?;
        Self::from_hex(algo.parse()?, hex_value)
    }

    #[must_use]
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Hex form of the digest value
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Verify a byte payload against this digest.
    ///
    /// Recomputes with this digest's own algorithm and compares. Any
    /// disagreement yields false; there is no "assume valid" path.
    #[must_use]
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(self.algorithm, data) == *self
    }

    /// Compute the digest of a file without loading it into memory
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read.
    pub async fn hash_file(algorithm: DigestAlgorithm, path: &Path) -> Result<Self, Error> {
        let mut file = File::open(path).await?;
        let mut hasher = StreamHasher::new(algorithm);
        let mut buffer = vec![0; CHUNK_SIZE];

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(hasher.finalize())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Create a content-addressed relative path from a SHA-256 hex key
///
/// Uses the first 2 chars as a directory level for better filesystem
/// performance: `ab12...` becomes `ab/12...`. Keys too short to shard
/// are returned unchanged.
#[must_use]
pub fn content_path(key: &str) -> String {
    if key.len() < 2 || !key.is_char_boundary(2) {
        return key.to_string();
    }
    let (shard, rest) = key.split_at(2);
    format!("{shard}/{rest}")
}
