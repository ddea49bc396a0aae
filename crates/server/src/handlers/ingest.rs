//! Documentation ingest and precache routes.

use crate::downloads::{Delivery, DownloadError};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceScrapeResponse {
    pub success: bool,
    pub chars: usize,
    pub package: String,
}

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    pub updated: usize,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecacheRequest {
    pub package_name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecacheResponse {
    pub success: bool,
    pub message: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
}

/// GET /force-scrape/{package} - synchronous documentation ingest.
///
/// Scrapes the README (falling back to the short description) out of the
/// upstream metadata and runs the chunk → embed → persist pipeline.
pub async fn force_scrape(
    State(state): State<AppState>,
    Path(package): Path<String>,
) -> ApiResult<Json<ForceScrapeResponse>> {
    let doc = state.registry.fetch_metadata(&package).await?;

    let text = doc
        .get("readme")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .or_else(|| doc.get("description").and_then(|v| v.as_str()))
        .unwrap_or("");

    let chars = text.chars().count();
    state.engine.ingest(&package, text).await?;

    Ok(Json(ForceScrapeResponse {
        success: true,
        chars,
        package,
    }))
}

/// POST /api/rebuild-embeddings/{package} - re-embed a package's chunks.
pub async fn rebuild_embeddings(
    State(state): State<AppState>,
    Path(package): Path<String>,
) -> ApiResult<Json<RebuildResponse>> {
    let (updated, total) = state.engine.rebuild_embeddings(&package).await?;
    Ok(Json(RebuildResponse { updated, total }))
}

/// POST /api/precache - download, verify, and record without a client
/// waiting on the bytes.
pub async fn precache(
    State(state): State<AppState>,
    Json(request): Json<PrecacheRequest>,
) -> ApiResult<Json<PrecacheResponse>> {
    let package = request.package_name;
    let doc = state.registry.fetch_metadata(&package).await?;

    let version = match request.version {
        Some(version) => version,
        None => doc
            .get("dist-tags")
            .and_then(|t| t.get("latest"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ApiError::NotFound(format!("{package} has no latest dist-tag"))
            })?,
    };

    let version_doc = doc
        .get("versions")
        .and_then(|v| v.get(&version))
        .ok_or_else(|| ApiError::NotFound(format!("unknown version {package}@{version}")))?;

    let filename = version_doc
        .get("dist")
        .and_then(|d| d.get("tarball"))
        .and_then(|t| t.as_str())
        .and_then(|url| url.rsplit('/').next())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{package}-{version}.tgz"));

    if state.cache.exists(&filename).await? {
        return Ok(Json(PrecacheResponse {
            success: true,
            message: format!("{package}@{version} already cached"),
            version,
            size: None,
            cached: Some(true),
        }));
    }

    let delivery = state
        .downloads
        .deliver(&package, &version, &filename)
        .await
        .map_err(|e| match e {
            DownloadError::Upstream(e) => ApiError::Upstream(e),
            DownloadError::Storage(e) => ApiError::Storage(e),
        })?;

    match delivery {
        Delivery::Cached => {}
        Delivery::Live { body, mut done } => {
            // No client is waiting on the bytes; dropping the body half
            // leaves the disk writer running to completion.
            drop(body);
            let outcome = done
                .wait_for(|o| o.is_some())
                .await
                .ok()
                .and_then(|o| o.clone());
            match outcome {
                Some(Ok(())) => {}
                Some(Err(detail)) => {
                    return Ok(Json(PrecacheResponse {
                        success: false,
                        message: format!("download failed: {detail}"),
                        version,
                        size: None,
                        cached: None,
                    }));
                }
                None => {
                    return Err(ApiError::Internal(
                        "download flight ended without an outcome".to_string(),
                    ));
                }
            }
        }
    }

    let size = state.cache.meta(&filename).await?.size;
    Ok(Json(PrecacheResponse {
        success: true,
        message: format!("{package}@{version} downloaded and verified"),
        version,
        size: Some(size),
        cached: None,
    }))
}
