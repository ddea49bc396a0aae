//! Registry proxy routes (read path).

use crate::downloads::{Delivery, DownloadError};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use larder_core::{parse_tarball_filename, rewrite_tarball_urls};

/// The scheme this server is reachable under. The proxy itself speaks
/// plain HTTP on the LAN; TLS termination, if any, is outside it.
const ADVERTISED_SCHEME: &str = "http";

/// The host clients should be sent back to, from the request itself.
///
/// This is the only place user identity (the request host) enters the
/// system; it propagates exclusively through URL rewriting. Falls back to
/// the configured bind address for clients that send no Host header.
pub fn request_host(headers: &HeaderMap, state: &AppState) -> String {
    headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| state.config.server.bind.clone())
}

/// Cache key of a package's rewritten metadata document.
fn doc_key(package: &str) -> String {
    format!("{package}.json")
}

/// GET /{package} - rewritten upstream metadata.
///
/// Online: fetch, rewrite tarball URLs to this server, persist, return.
/// Offline: re-rewrite the persisted copy against the current request
/// host, because the server's advertised address may have changed since
/// the document was cached. Neither copy available is a 502 (or 404 when
/// the upstream itself does not know the package).
pub async fn package_metadata(
    State(state): State<AppState>,
    Path(package): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let host = request_host(&headers, &state);

    match state.registry.fetch_metadata(&package).await {
        Ok(mut doc) => {
            rewrite_tarball_urls(&mut doc, ADVERTISED_SCHEME, &host);
            let bytes = serde_json::to_vec(&doc)
                .map_err(|e| ApiError::Internal(format!("metadata serialization failed: {e}")))?;
            state.cache.write(&doc_key(&package), Bytes::from(bytes)).await?;
            Ok(Json(doc).into_response())
        }
        Err(e) => {
            tracing::warn!(package = %package, error = %e, "upstream metadata fetch failed, trying cache");
            match state.cache.read(&doc_key(&package)).await {
                Ok(bytes) => {
                    let mut doc: serde_json::Value = serde_json::from_slice(&bytes).map_err(
                        |e| ApiError::Internal(format!("cached metadata is corrupt: {e}")),
                    )?;
                    rewrite_tarball_urls(&mut doc, ADVERTISED_SCHEME, &host);
                    Ok(Json(doc).into_response())
                }
                Err(larder_storage::StorageError::NotFound(_)) => {
                    if e.is_not_found() {
                        Err(ApiError::NotFound(format!("package {package}")))
                    } else {
                        Err(ApiError::UpstreamUnavailable(e.to_string()))
                    }
                }
                Err(cache_err) => Err(cache_err.into()),
            }
        }
    }
}

/// GET /{package}/-/{filename} - stream the tarball.
///
/// Disk hits stream straight from the cache; misses go through the
/// single-flight coordinator which tees the upstream body to this client
/// and the cache simultaneously.
pub async fn package_tarball(
    State(state): State<AppState>,
    Path((package, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    let version = parse_tarball_filename(&package, &filename)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let delivery = state
        .downloads
        .deliver(&package, &version, &filename)
        .await
        .map_err(|e| match e {
            DownloadError::Upstream(e) => ApiError::Upstream(e),
            DownloadError::Storage(e) => ApiError::Storage(e),
        })?;

    match delivery {
        Delivery::Cached => {
            let meta = state.cache.meta(&filename).await?;
            let stream = state.cache.read_stream(&filename).await?;
            let body = Body::from_stream(stream);
            Ok((
                StatusCode::OK,
                [
                    (CONTENT_TYPE, "application/octet-stream".to_string()),
                    (CONTENT_LENGTH, meta.size.to_string()),
                ],
                body,
            )
                .into_response())
        }
        Delivery::Live { body, done: _ } => {
            let stream = async_stream::stream! {
                let mut body = body;
                while let Some(item) = body.recv().await {
                    yield item;
                }
            };
            Ok((
                StatusCode::OK,
                [(CONTENT_TYPE, "application/octet-stream")],
                Body::from_stream(stream),
            )
                .into_response())
        }
    }
}
