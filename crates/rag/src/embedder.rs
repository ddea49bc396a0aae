//! The injected embedding function.

use async_trait::async_trait;
use thiserror::Error;

/// Failure to obtain an embedding from the backend.
#[derive(Debug, Error)]
#[error("embedding backend unavailable: {0}")]
pub struct EmbedError(pub String);

/// Produces a fixed-dimensional vector for a text.
///
/// Implemented by the model-backend client at the composition root; the
/// engine itself has no dependency on any particular backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}
