//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid integrity string: {0}")]
    InvalidIntegrity(String),

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid tarball filename: {0}")]
    InvalidTarballFilename(String),

    #[error("malformed metadata document: {0}")]
    MalformedMetadata(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
