//! Stats and health routes.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use larder_metadata::{CacheRepo, ChunkRepo, EventRepo, MetadataStore};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_chunks: u64,
    pub cached_responses: u64,
    pub embeddings_cached: u64,
    pub distinct_packages: usize,
    pub packages: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorStatsResponse {
    pub total_chunks: u64,
    pub chunks_with_embeddings: u64,
    pub embedding_coverage_percent: f64,
    pub embeddings_cached: u64,
    pub responses_cached: u64,
    pub vector_optimization_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEventView {
    pub package_name: String,
    pub version: String,
    pub kind: String,
    pub observed_digest: Option<String>,
    pub expected_digest: Option<String>,
    pub details: Option<String>,
    pub at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityStatsResponse {
    pub total_verifications: u64,
    pub successful: u64,
    pub threats_detected: u64,
    pub failures: u64,
    /// Percentage with two decimal places, as a string.
    pub success_rate: String,
    pub recent_events: Vec<SecurityEventView>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /api/health - liveness probe, checks store connectivity.
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.store.health_check().await?;
    Ok(Json(HealthResponse { status: "ok" }))
}

/// GET /api/stats - retrieval store counters.
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let now = OffsetDateTime::now_utc();
    // Piggyback TTL reclamation on the stats poll; there is no scheduler.
    let purged = state.store.purge_expired(now).await?;
    if purged > 0 {
        tracing::debug!(purged, "reclaimed expired cache entries");
    }

    let chunk_stats = state.store.chunk_stats().await?;
    Ok(Json(StatsResponse {
        total_chunks: chunk_stats.total_chunks,
        cached_responses: state.store.fresh_response_count(now).await?,
        embeddings_cached: state.store.fresh_embedding_count(now).await?,
        distinct_packages: chunk_stats.packages.len(),
        packages: chunk_stats.packages,
    }))
}

/// GET /api/vector-stats - embedding coverage counters.
pub async fn vector_stats(State(state): State<AppState>) -> ApiResult<Json<VectorStatsResponse>> {
    let now = OffsetDateTime::now_utc();
    let chunk_stats = state.store.chunk_stats().await?;

    let coverage = if chunk_stats.total_chunks == 0 {
        0.0
    } else {
        (chunk_stats.chunks_with_embedding as f64 / chunk_stats.total_chunks as f64) * 100.0
    };

    Ok(Json(VectorStatsResponse {
        total_chunks: chunk_stats.total_chunks,
        chunks_with_embeddings: chunk_stats.chunks_with_embedding,
        embedding_coverage_percent: (coverage * 100.0).round() / 100.0,
        embeddings_cached: state.store.fresh_embedding_count(now).await?,
        responses_cached: state.store.fresh_response_count(now).await?,
        vector_optimization_enabled: !state.config.model.embedding_model.is_empty(),
    }))
}

/// GET /api/security-stats - audit aggregates and the recent feed.
pub async fn security_stats(
    State(state): State<AppState>,
) -> ApiResult<Json<SecurityStatsResponse>> {
    let totals = state.store.event_totals().await?;

    let success_rate = if totals.total == 0 {
        "0.00".to_string()
    } else {
        format!(
            "{:.2}",
            (totals.success as f64 / totals.total as f64) * 100.0
        )
    };

    let recent_events = state
        .store
        .recent_events(10)
        .await?
        .into_iter()
        .map(|e| SecurityEventView {
            package_name: e.package_name,
            version: e.version,
            kind: e.kind,
            observed_digest: e.observed_digest,
            expected_digest: e.expected_digest,
            details: e.details,
            at: e
                .created_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| e.created_at.to_string()),
        })
        .collect();

    Ok(Json(SecurityStatsResponse {
        total_verifications: totals.total,
        successful: totals.success,
        threats_detected: totals.threats_detected,
        failures: totals.failures,
        success_rate,
        recent_events,
    }))
}
