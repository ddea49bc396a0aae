//! Documentation chunk repository.

use crate::error::MetadataResult;
use crate::models::{ChunkRow, ChunkStats};
use async_trait::async_trait;

/// Documentation chunks keyed by `(package_name, chunk_index)`.
#[async_trait]
pub trait ChunkRepo: Send + Sync {
    /// Replace a package's chunk set atomically: the old set is deleted
    /// and the new one inserted in a single transaction.
    async fn replace_chunks(&self, package: &str, chunks: &[ChunkRow]) -> MetadataResult<()>;

    /// All chunks of one package, ordered by index.
    async fn get_chunks(&self, package: &str) -> MetadataResult<Vec<ChunkRow>>;

    /// Every chunk carrying an embedding, across all packages.
    async fn embedded_chunks(&self) -> MetadataResult<Vec<ChunkRow>>;

    /// Chunks whose text matches any of the given lowercase tokens,
    /// case-insensitively, up to `limit` rows.
    async fn lexical_search(&self, tokens: &[String], limit: u32) -> MetadataResult<Vec<ChunkRow>>;

    /// Store a freshly computed embedding for one chunk.
    async fn update_chunk_embedding(
        &self,
        package: &str,
        chunk_index: i64,
        embedding: &[u8],
    ) -> MetadataResult<()>;

    /// Aggregate counts and the distinct package list.
    async fn chunk_stats(&self) -> MetadataResult<ChunkStats>;
}
