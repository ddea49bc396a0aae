//! Embedding and response cache repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use time::OffsetDateTime;

/// The two TTL caches.
///
/// Reads take `now` explicitly so expiry is decided by the caller's
/// clock; an entry past its `expires_at` is never returned even though
/// the row may persist until `purge_expired` reclaims it.
#[async_trait]
pub trait CacheRepo: Send + Sync {
    /// Look up a cached embedding if present and fresh.
    async fn get_embedding(
        &self,
        text_digest: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<Vec<u8>>>;

    /// Upsert an embedding with its expiry.
    async fn put_embedding(
        &self,
        text_digest: &str,
        embedding: &[u8],
        now: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Number of fresh embedding entries.
    async fn fresh_embedding_count(&self, now: OffsetDateTime) -> MetadataResult<u64>;

    /// Look up a cached answer if present and fresh.
    async fn get_response(
        &self,
        question_digest: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<String>>;

    /// Upsert an answer with its expiry.
    async fn put_response(
        &self,
        question_digest: &str,
        answer: &str,
        now: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Number of fresh response entries.
    async fn fresh_response_count(&self, now: OffsetDateTime) -> MetadataResult<u64>;

    /// Physically delete expired entries from both caches.
    ///
    /// Returns the number of rows reclaimed.
    async fn purge_expired(&self, now: OffsetDateTime) -> MetadataResult<u64>;
}
