//! Streaming digest computation over cached tarball files.

use crate::integrity::{HashAlgorithm, IntegrityString};
use base64::Engine;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Read buffer for streaming digests (64 KiB).
const HASH_BUF_SIZE: usize = 64 * 1024;

/// Incremental digest over one of the supported algorithms.
///
/// Memory use is bounded by the hasher state; the input is fed in chunks
/// regardless of total size.
pub enum IntegrityHasher {
    Sha512(Sha512),
    Sha256(Sha256),
    Sha1(Sha1),
}

impl IntegrityHasher {
    /// Create a hasher for the given algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
        }
    }

    /// Feed a chunk of data.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha512(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha1(h) => h.update(data),
        }
    }

    /// Finalize into the canonical `<algo>-<base64>` form.
    pub fn finalize(self) -> IntegrityString {
        let engine = base64::engine::general_purpose::STANDARD;
        match self {
            Self::Sha512(h) => {
                IntegrityString::new(HashAlgorithm::Sha512, &engine.encode(h.finalize()))
            }
            Self::Sha256(h) => {
                IntegrityString::new(HashAlgorithm::Sha256, &engine.encode(h.finalize()))
            }
            Self::Sha1(h) => IntegrityString::new(HashAlgorithm::Sha1, &engine.encode(h.finalize())),
        }
    }
}

/// Compute the digest of a file as an integrity string.
///
/// The file is read as a byte stream in 64 KiB chunks; memory use is
/// independent of file size. I/O errors are fatal to the caller.
pub async fn digest_file(
    path: impl AsRef<Path>,
    algorithm: HashAlgorithm,
) -> crate::Result<IntegrityString> {
    let mut file = tokio::fs::File::open(path.as_ref()).await?;
    let mut hasher = IntegrityHasher::new(algorithm);
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}
