//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (for probes and the LAN dashboard)
        .route("/api/health", get(handlers::health))
        // Documentation Q&A
        .route("/api/chat", post(handlers::chat))
        .route("/api/hybrid-search", post(handlers::hybrid_search))
        // Counters
        .route("/api/stats", get(handlers::stats))
        .route("/api/vector-stats", get(handlers::vector_stats))
        .route("/api/security-stats", get(handlers::security_stats))
        // Maintenance
        .route(
            "/api/rebuild-embeddings/{package}",
            post(handlers::rebuild_embeddings),
        )
        .route("/api/precache", post(handlers::precache))
        .route("/force-scrape/{package}", get(handlers::force_scrape));

    // Registry proxy routes; static prefixes above take precedence over
    // the package capture.
    let proxy_routes = Router::new()
        .route("/{package}", get(handlers::package_metadata))
        .route("/{package}/-/{filename}", get(handlers::package_tarball));

    Router::new()
        .merge(api_routes)
        .merge(proxy_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
