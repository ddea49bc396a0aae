//! Retrieval engine error types.

use thiserror::Error;

/// Errors from retrieval operations.
///
/// Embedding backend failures are deliberately absent: they put the
/// engine into lexical-only degraded mode instead of failing the caller.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("metadata error: {0}")]
    Metadata(#[from] larder_metadata::MetadataError),
}

/// Result type for retrieval operations.
pub type RagResult<T> = std::result::Result<T, RagError>;
