//! Hybrid search and documentation ingest.

use crate::embedder::Embedder;
use crate::error::RagResult;
use crate::{blob_to_vec, text_digest, vec_to_blob};
use larder_core::config::RagConfig;
use larder_core::{chunk_text, cosine_similarity};
use larder_metadata::models::ChunkRow;
use larder_metadata::{CacheRepo, ChunkRepo, MetadataStore};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

/// Only query tokens longer than this participate in the lexical pass.
const MIN_TOKEN_LEN: usize = 3;

/// One ranked retrieval result.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub package_name: String,
    pub chunk_index: i64,
    pub text: String,
    /// Cosine similarity to the query, 0 when semantic ranking was
    /// unavailable or the chunk only matched lexically.
    pub vector_score: f32,
    /// 1 when the chunk matched a query token, else 0.
    pub lexical_score: f32,
    pub combined_score: f32,
}

/// Outcome of ingesting one package's documentation.
#[derive(Debug, Clone, Copy)]
pub struct IngestReport {
    pub chunks: usize,
    pub embedded: usize,
}

/// Hybrid retrieval over persisted documentation chunks.
///
/// Owns the chunk store and the embedding cache; the embedding function
/// itself is injected. All scoring happens in-process over the loaded
/// candidate sets, which at LAN scale stay small.
pub struct RetrievalEngine {
    store: Arc<dyn MetadataStore>,
    embedder: Arc<dyn Embedder>,
    config: RagConfig,
}

impl RetrievalEngine {
    /// Create an engine.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        embedder: Arc<dyn Embedder>,
        config: RagConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Obtain an embedding through the cache, tolerating backend failure.
    ///
    /// Returns `None` in degraded mode: the backend is down or the model
    /// is missing. Callers proceed without a vector.
    pub async fn embed_cached(&self, text: &str) -> RagResult<Option<Vec<f32>>> {
        let digest = text_digest(text);
        let now = OffsetDateTime::now_utc();

        if let Some(blob) = self.store.get_embedding(&digest, now).await? {
            return Ok(Some(blob_to_vec(&blob)));
        }

        match self.embedder.embed(text).await {
            Ok(vector) => {
                let expires_at = now + self.config.embedding_ttl();
                self.store
                    .put_embedding(&digest, &vec_to_blob(&vector), now, expires_at)
                    .await?;
                Ok(Some(vector))
            }
            Err(e) => {
                tracing::debug!(error = %e, "embedding unavailable, degrading to lexical");
                Ok(None)
            }
        }
    }

    /// Extract lowercase lexical tokens longer than [`MIN_TOKEN_LEN`].
    fn query_tokens(query: &str) -> Vec<String> {
        let mut tokens: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > MIN_TOKEN_LEN)
            .map(str::to_string)
            .collect();
        tokens.dedup();
        tokens
    }

    /// Rank chunks for a query, returning at most `top_k` results.
    #[instrument(skip(self), fields(top_k))]
    pub async fn search(&self, query: &str, top_k: usize) -> RagResult<Vec<ScoredChunk>> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let candidate_k = top_k * 2;
        let query_vec = self.embed_cached(query).await?;

        // Semantic pass over every embedded chunk.
        let mut semantic: Vec<(ChunkRow, f32)> = Vec::new();
        if let Some(query_vec) = &query_vec {
            for chunk in self.store.embedded_chunks().await? {
                let Some(blob) = &chunk.embedding else { continue };
                let similarity = cosine_similarity(query_vec, &blob_to_vec(blob));
                if similarity >= self.config.min_similarity {
                    semantic.push((chunk, similarity));
                }
            }
            semantic.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            semantic.truncate(candidate_k);
        }

        // Lexical pass over the token disjunction.
        let tokens = Self::query_tokens(query);
        let lexical = if tokens.is_empty() {
            Vec::new()
        } else {
            self.store
                .lexical_search(&tokens, candidate_k as u32)
                .await?
        };

        // Merge by chunk identity.
        let mut merged: HashMap<(String, i64), ScoredChunk> = HashMap::new();
        for (chunk, similarity) in semantic {
            merged.insert(
                (chunk.package_name.clone(), chunk.chunk_index),
                ScoredChunk {
                    package_name: chunk.package_name,
                    chunk_index: chunk.chunk_index,
                    text: chunk.text,
                    vector_score: similarity,
                    lexical_score: 0.0,
                    combined_score: 0.0,
                },
            );
        }
        for chunk in lexical {
            merged
                .entry((chunk.package_name.clone(), chunk.chunk_index))
                .or_insert_with(|| ScoredChunk {
                    package_name: chunk.package_name,
                    chunk_index: chunk.chunk_index,
                    text: chunk.text,
                    vector_score: 0.0,
                    lexical_score: 0.0,
                    combined_score: 0.0,
                })
                .lexical_score = 1.0;
        }

        let mut results: Vec<ScoredChunk> = merged
            .into_values()
            .map(|mut c| {
                c.combined_score = self.config.vector_weight * c.vector_score
                    + self.config.lexical_weight * c.lexical_score;
                c
            })
            .collect();

        results.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.vector_score
                        .partial_cmp(&a.vector_score)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.chunk_index.cmp(&b.chunk_index))
                .then(a.package_name.cmp(&b.package_name))
        });
        results.truncate(top_k);
        Ok(results)
    }

    /// Chunk, embed, and persist one package's documentation.
    ///
    /// The prior chunk set is replaced atomically; repeated ingests are
    /// idempotent from the caller's perspective. An unreachable embedding
    /// backend leaves chunks without vectors, still lexically searchable.
    #[instrument(skip(self, text), fields(chars = text.len()))]
    pub async fn ingest(&self, package: &str, text: &str) -> RagResult<IngestReport> {
        let truncated: String = text.chars().take(larder_core::MAX_DOC_CHARS).collect();
        let windows = chunk_text(&truncated, self.config.chunk_size, self.config.chunk_overlap);

        let now = OffsetDateTime::now_utc();
        let mut rows = Vec::with_capacity(windows.len());
        let mut embedded = 0usize;
        for (index, window) in windows.into_iter().enumerate() {
            let embedding = self.embed_cached(&window).await?.map(|v| {
                embedded += 1;
                vec_to_blob(&v)
            });
            rows.push(ChunkRow {
                package_name: package.to_string(),
                chunk_index: index as i64,
                text: window,
                embedding,
                created_at: now,
            });
        }

        let chunks = rows.len();
        self.store.replace_chunks(package, &rows).await?;
        tracing::info!(package, chunks, embedded, "documentation ingested");
        Ok(IngestReport { chunks, embedded })
    }

    /// Re-embed every chunk of one package.
    ///
    /// Returns `(updated, total)`; chunks the backend fails on keep their
    /// previous embedding (or stay absent).
    #[instrument(skip(self))]
    pub async fn rebuild_embeddings(&self, package: &str) -> RagResult<(usize, usize)> {
        let chunks = self.store.get_chunks(package).await?;
        let total = chunks.len();
        let mut updated = 0usize;

        for chunk in chunks {
            if let Some(vector) = self.embed_cached(&chunk.text).await? {
                self.store
                    .update_chunk_embedding(package, chunk.chunk_index, &vec_to_blob(&vector))
                    .await?;
                updated += 1;
            }
        }
        Ok((updated, total))
    }

    /// Look up a previously cached answer for a question.
    pub async fn cached_answer(&self, question: &str) -> RagResult<Option<String>> {
        let digest = text_digest(question);
        Ok(self
            .store
            .get_response(&digest, OffsetDateTime::now_utc())
            .await?)
    }

    /// Memoize an answer under the question's digest.
    pub async fn store_answer(&self, question: &str, answer: &str) -> RagResult<()> {
        let digest = text_digest(question);
        let now = OffsetDateTime::now_utc();
        self.store
            .put_response(&digest, answer, now, now + self.config.response_ttl())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EmbedError;
    use async_trait::async_trait;
    use larder_metadata::SqliteStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted embedder: vectors keyed by substring, optional outage.
    struct FakeEmbedder {
        calls: AtomicUsize,
        down: bool,
    }

    impl FakeEmbedder {
        fn up() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                down: false,
            }
        }

        fn offline() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                down: true,
            }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down {
                return Err(EmbedError("backend offline".to_string()));
            }
            // Orthogonal-ish axes per topic keep the cosine math legible.
            let lower = text.to_lowercase();
            if lower.contains("bravo") {
                Ok(vec![1.0, 0.0, 0.0])
            } else if lower.contains("echo") {
                Ok(vec![0.0, 1.0, 0.0])
            } else {
                Ok(vec![0.0, 0.0, 1.0])
            }
        }
    }

    async fn build_engine(
        embedder: FakeEmbedder,
    ) -> (tempfile::TempDir, Arc<SqliteStore>, RetrievalEngine) {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteStore::new(temp.path().join("larder.db"))
                .await
                .unwrap(),
        );
        let engine = RetrievalEngine::new(
            store.clone(),
            Arc::new(embedder),
            RagConfig::default(),
        );
        (temp, store, engine)
    }

    #[tokio::test]
    async fn ingest_then_lexical_ranking() {
        let (_temp, _store, engine) = build_engine(FakeEmbedder::up()).await;

        engine.ingest("alpha-pkg", "Alpha Bravo Charlie").await.unwrap();
        engine.ingest("delta-pkg", "Delta Echo Foxtrot").await.unwrap();

        let results = engine.search("bravo", 5).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].package_name, "alpha-pkg");
        assert!(results[0].lexical_score > 0.0);
    }

    #[tokio::test]
    async fn degraded_mode_still_answers_lexically() {
        let (_temp, _store, engine) = build_engine(FakeEmbedder::offline()).await;

        let report = engine.ingest("alpha-pkg", "Alpha Bravo Charlie").await.unwrap();
        assert_eq!(report.chunks, 1);
        assert_eq!(report.embedded, 0);

        let results = engine.search("bravo", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].package_name, "alpha-pkg");
        assert_eq!(results[0].vector_score, 0.0);
        assert_eq!(results[0].lexical_score, 1.0);
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let (_temp, _store, engine) = build_engine(FakeEmbedder::up()).await;
        engine.ingest("alpha-pkg", "Alpha Bravo Charlie").await.unwrap();

        assert!(engine.search("", 5).await.unwrap().is_empty());
        assert!(engine.search("   ", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn semantic_match_ranks_without_lexical_overlap() {
        let (_temp, _store, engine) = build_engine(FakeEmbedder::up()).await;

        engine.ingest("alpha-pkg", "Alpha Bravo Charlie").await.unwrap();
        engine.ingest("delta-pkg", "Delta Echo Foxtrot").await.unwrap();

        // "bravo team" embeds on the bravo axis; the alpha-pkg chunk was
        // embedded on the same axis at ingest, so it wins on vector score
        // and the combined 0.7/0.3 weighting.
        let results = engine.search("bravo team", 5).await.unwrap();
        assert_eq!(results[0].package_name, "alpha-pkg");
        assert!(results[0].vector_score > 0.9);
        assert!(results[0].combined_score > 0.9);
    }

    #[tokio::test]
    async fn embedding_cache_hit_skips_second_call() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteStore::new(temp.path().join("larder.db"))
                .await
                .unwrap(),
        );
        let embedder = Arc::new(FakeEmbedder::up());
        let engine = RetrievalEngine::new(store, embedder.clone(), RagConfig::default());

        engine.embed_cached("bravo question").await.unwrap();
        engine.embed_cached("bravo question").await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reingest_replaces_chunk_set() {
        let (_temp, store, engine) = build_engine(FakeEmbedder::up()).await;

        let long_text = "alpha bravo ".repeat(200);
        engine.ingest("alpha-pkg", &long_text).await.unwrap();
        let before = store.get_chunks("alpha-pkg").await.unwrap().len();
        assert!(before > 1);

        engine.ingest("alpha-pkg", "short now").await.unwrap();
        let after = store.get_chunks("alpha-pkg").await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn rebuild_embeddings_counts_updates() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteStore::new(temp.path().join("larder.db"))
                .await
                .unwrap(),
        );

        // Ingest while offline: chunks persist without vectors.
        let offline = RetrievalEngine::new(
            store.clone(),
            Arc::new(FakeEmbedder::offline()),
            RagConfig::default(),
        );
        offline.ingest("alpha-pkg", "Alpha Bravo Charlie").await.unwrap();

        // Rebuild once the backend is back.
        let online = RetrievalEngine::new(
            store.clone(),
            Arc::new(FakeEmbedder::up()),
            RagConfig::default(),
        );
        let (updated, total) = online.rebuild_embeddings("alpha-pkg").await.unwrap();
        assert_eq!((updated, total), (1, 1));
        assert!(store.get_chunks("alpha-pkg").await.unwrap()[0]
            .embedding
            .is_some());
    }

    #[tokio::test]
    async fn response_cache_roundtrip_is_bit_identical() {
        let (_temp, _store, engine) = build_engine(FakeEmbedder::up()).await;

        assert!(engine.cached_answer("what?").await.unwrap().is_none());
        engine.store_answer("what?", "that!").await.unwrap();
        assert_eq!(
            engine.cached_answer("what?").await.unwrap().as_deref(),
            Some("that!")
        );
    }

    #[tokio::test]
    async fn ingest_truncates_oversized_documents() {
        let (_temp, store, engine) = build_engine(FakeEmbedder::up()).await;

        let huge = "x".repeat(20_000);
        engine.ingest("big-pkg", &huge).await.unwrap();

        let total_chars: usize = store
            .get_chunks("big-pkg")
            .await
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let len = c.text.chars().count();
                if i == 0 { len } else { len - 100 }
            })
            .sum();
        assert_eq!(total_chars, larder_core::MAX_DOC_CHARS);
    }
}
