//! Incremental hashing over the supported algorithms

use crate::{Digest, DigestAlgorithm};
use md5::Md5;
use sha1::Sha1;
use sha2::digest::Digest as _;
use sha2::Sha256;

/// Incremental hasher dispatching over the supported algorithms.
///
/// Used by the fetch path to hash payloads while streaming them, so
/// large artifacts are never buffered twice.
pub struct StreamHasher {
    inner: Inner,
}

enum Inner {
    Sha256(Sha256),
    Sha1(Sha1),
    Md5(Md5),
}

impl StreamHasher {
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        let inner = match algorithm {
            DigestAlgorithm::Sha256 => Inner::Sha256(Sha256::new()),
            DigestAlgorithm::Sha1 => Inner::Sha1(Sha1::new()),
            DigestAlgorithm::Md5 => Inner::Md5(Md5::new()),
        };
        Self { inner }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Sha256(h) => h.update(data),
            Inner::Sha1(h) => h.update(data),
            Inner::Md5(h) => h.update(data),
        }
    }

    #[must_use]
    pub fn finalize(self) -> Digest {
        match self.inner {
            Inner::Sha256(h) => {
                Digest::from_raw(DigestAlgorithm::Sha256, h.finalize().to_vec())
            }
            Inner::Sha1(h) => Digest::from_raw(DigestAlgorithm::Sha1, h.finalize().to_vec()),
            Inner::Md5(h) => Digest::from_raw(DigestAlgorithm::Md5, h.finalize().to_vec()),
        }
    }
}
