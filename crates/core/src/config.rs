//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:4873").
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:4873".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Upstream registry configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the public registry.
    #[serde(default = "default_registry_url")]
    pub registry_url: String,
    /// Timeout for metadata fetches in seconds.
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,
    /// Idle timeout while streaming a tarball body, in seconds.
    #[serde(default = "default_tarball_idle_timeout_secs")]
    pub tarball_idle_timeout_secs: u64,
    /// Maximum idle connections kept per upstream host.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_registry_url() -> String {
    "https://registry.npmjs.org".to_string()
}

fn default_metadata_timeout_secs() -> u64 {
    10
}

fn default_tarball_idle_timeout_secs() -> u64 {
    60
}

fn default_pool_size() -> usize {
    50
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            registry_url: default_registry_url(),
            metadata_timeout_secs: default_metadata_timeout_secs(),
            tarball_idle_timeout_secs: default_tarball_idle_timeout_secs(),
            pool_size: default_pool_size(),
        }
    }
}

impl UpstreamConfig {
    /// Metadata fetch timeout as a Duration.
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    /// Tarball stream idle timeout as a Duration.
    pub fn tarball_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.tarball_idle_timeout_secs)
    }
}

/// On-disk cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding cached tarballs and metadata documents.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./data/cache")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// SQLite database file path.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/larder.db")
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Embedding and generation backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the model backend.
    #[serde(default = "default_model_url")]
    pub base_url: String,
    /// Embedding model identifier.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Generation model identifier.
    #[serde(default = "default_generation_model")]
    pub generation_model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_generation_model() -> String {
    "llama3.2".to_string()
}

fn default_model_timeout_secs() -> u64 {
    30
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_url(),
            embedding_model: default_embedding_model(),
            generation_model: default_generation_model(),
            timeout_secs: default_model_timeout_secs(),
        }
    }
}

impl ModelConfig {
    /// Backend request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retrieval tuning configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RagConfig {
    /// Chunk window size in code units.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between adjacent chunk windows, in code units.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Minimum cosine similarity for the semantic pass.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    /// Weight of the vector score in hybrid ranking.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
    /// Weight of the lexical score in hybrid ranking.
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,
    /// Embedding cache TTL in seconds.
    #[serde(default = "default_embedding_ttl_secs")]
    pub embedding_ttl_secs: u64,
    /// Response cache TTL in seconds.
    #[serde(default = "default_response_ttl_secs")]
    pub response_ttl_secs: u64,
}

fn default_chunk_size() -> usize {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    crate::DEFAULT_CHUNK_OVERLAP
}

fn default_min_similarity() -> f32 {
    0.3
}

fn default_vector_weight() -> f32 {
    0.7
}

fn default_lexical_weight() -> f32 {
    0.3
}

fn default_embedding_ttl_secs() -> u64 {
    3600
}

fn default_response_ttl_secs() -> u64 {
    86400
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_similarity: default_min_similarity(),
            vector_weight: default_vector_weight(),
            lexical_weight: default_lexical_weight(),
            embedding_ttl_secs: default_embedding_ttl_secs(),
            response_ttl_secs: default_response_ttl_secs(),
        }
    }
}

impl RagConfig {
    /// Validate retrieval configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("rag.chunk_size must be greater than zero".to_string());
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(format!(
                "rag.chunk_overlap {} must be smaller than rag.chunk_size {}",
                self.chunk_overlap, self.chunk_size
            ));
        }
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(format!(
                "rag.min_similarity {} must be within [0, 1]",
                self.min_similarity
            ));
        }
        Ok(())
    }

    /// Embedding cache TTL as a Duration.
    pub fn embedding_ttl(&self) -> Duration {
        Duration::from_secs(self.embedding_ttl_secs)
    }

    /// Response cache TTL as a Duration.
    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_secs)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream registry configuration.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// On-disk cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Model backend configuration.
    #[serde(default)]
    pub model: ModelConfig,
    /// Retrieval tuning configuration.
    #[serde(default)]
    pub rag: RagConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Paths point under `./data` and are expected
    /// to be overridden with tempdir paths by the test harness.
    pub fn for_testing() -> Self {
        Self::default()
    }
}
