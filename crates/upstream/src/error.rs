//! Upstream client error types.

use thiserror::Error;

/// Errors from outbound registry and model-backend calls.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connection, TLS, or timeout failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// The requested package or version does not exist upstream.
    #[error("not found upstream: {0}")]
    NotFound(String),

    /// The remote answered with a payload we cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl UpstreamError {
    /// Whether this error is an upstream 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for upstream operations.
pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;
