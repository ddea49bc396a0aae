//! Retrieval-augmented documentation search for Larder.
//!
//! The engine ranks persisted documentation chunks by a weighted blend of
//! semantic (cosine over embeddings) and lexical (token match) signals.
//! The embedding function is injected via the [`Embedder`] trait so this
//! crate never talks to a model backend directly; when the embedder fails
//! the engine degrades to lexical-only ranking instead of erroring.

pub mod embedder;
pub mod engine;
pub mod error;
pub mod vector;

pub use embedder::{EmbedError, Embedder};
pub use engine::{IngestReport, RetrievalEngine, ScoredChunk};
pub use error::{RagError, RagResult};
pub use vector::{blob_to_vec, vec_to_blob};

use sha2::{Digest, Sha256};

/// SHA-256 hex digest used as the content address for both caches.
pub fn text_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
