//! Application state shared across handlers.

use crate::downloads::DownloadCoordinator;
use async_trait::async_trait;
use larder_core::config::AppConfig;
use larder_metadata::MetadataStore;
use larder_rag::{EmbedError, Embedder, RetrievalEngine};
use larder_storage::CacheDir;
use larder_upstream::{ModelClient, RegistryClient};
use std::sync::Arc;

/// Adapter injecting the model backend as the engine's embedding function.
pub struct ModelEmbedder(pub Arc<ModelClient>);

#[async_trait]
impl Embedder for ModelEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.0.embed(text).await.map_err(|e| EmbedError(e.to_string()))
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// On-disk tarball and metadata document cache.
    pub cache: Arc<CacheDir>,
    /// Metadata store.
    pub store: Arc<dyn MetadataStore>,
    /// Upstream registry client.
    pub registry: Arc<RegistryClient>,
    /// Model backend client.
    pub model: Arc<ModelClient>,
    /// Hybrid retrieval engine.
    pub engine: Arc<RetrievalEngine>,
    /// Single-flight download coordinator.
    pub downloads: Arc<DownloadCoordinator>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Validates configuration invariants up front.
    ///
    /// # Panics
    ///
    /// Panics if retrieval configuration validation fails; a bad weight
    /// or chunk geometry would silently corrupt every ranking.
    pub fn new(
        config: AppConfig,
        cache: Arc<CacheDir>,
        store: Arc<dyn MetadataStore>,
        registry: Arc<RegistryClient>,
        model: Arc<ModelClient>,
    ) -> Self {
        if let Err(error) = config.rag.validate() {
            panic!("Invalid retrieval configuration: {error}");
        }

        let engine = Arc::new(RetrievalEngine::new(
            store.clone(),
            Arc::new(ModelEmbedder(model.clone())),
            config.rag.clone(),
        ));
        let downloads = Arc::new(DownloadCoordinator::new(
            cache.clone(),
            registry.clone(),
            store.clone(),
        ));

        Self {
            config: Arc::new(config),
            cache,
            store,
            registry,
            model,
            engine,
            downloads,
        }
    }
}
