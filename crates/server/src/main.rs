//! Larder server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use larder_core::config::AppConfig;
use larder_metadata::MetadataStore;
use larder_server::reclaim::reclaim_cache;
use larder_server::{AppState, create_router};
use larder_storage::CacheDir;
use larder_upstream::{ModelClient, RegistryClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Larder - a LAN-local package registry proxy
#[derive(Parser, Debug)]
#[command(name = "larderd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "LARDER_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Startup banner
    tracing::info!("Larder v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}, using defaults and env", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("LARDER_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Initialize the metadata store
    let store = larder_metadata::open(&config.metadata.path)
        .await
        .context("failed to initialize metadata store")?;
    store
        .health_check()
        .await
        .context("metadata store health check failed")?;
    tracing::info!(path = %config.metadata.path.display(), "Metadata store initialized");

    // Initialize the cache directory
    let cache = Arc::new(
        CacheDir::new(&config.cache.dir)
            .await
            .context("failed to initialize cache directory")?,
    );
    tracing::info!(dir = %config.cache.dir.display(), "Cache directory initialized");

    // Reclaim partial downloads left by a previous instance
    let stats = reclaim_cache(&cache, &store)
        .await
        .context("cache reclamation failed")?;
    if stats.temp_files_removed > 0 || stats.tarballs_removed > 0 {
        tracing::warn!(
            temp_files = stats.temp_files_removed,
            tarballs = stats.tarballs_removed,
            "Reclaimed stale cache entries from previous instance"
        );
    }

    // Outbound clients
    let registry = Arc::new(
        RegistryClient::new(&config.upstream).context("failed to build registry client")?,
    );
    tracing::info!(url = %config.upstream.registry_url, "Upstream registry client ready");

    let model =
        Arc::new(ModelClient::new(&config.model).context("failed to build model client")?);
    tracing::info!(
        url = %config.model.base_url,
        embedding_model = %config.model.embedding_model,
        generation_model = %config.model.generation_model,
        "Model backend client ready"
    );

    // Create application state and router
    let bind = config.server.bind.clone();
    let state = AppState::new(config, cache, store, registry, model);
    let app = create_router(state);

    // Parse bind address
    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
