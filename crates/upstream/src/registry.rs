//! Client for the public package registry.

use crate::error::{UpstreamError, UpstreamResult};
use bytes::Bytes;
use futures::Stream;
use larder_core::config::UpstreamConfig;
use std::pin::Pin;
use tracing::instrument;

/// A boxed stream of tarball bytes from the upstream.
pub type TarballStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Pooled HTTPS client for the upstream registry.
///
/// TLS 1.2 is the floor and certificate validation is always on. Metadata
/// fetches carry an overall deadline; tarball streams carry an idle read
/// timeout so a stalled upstream cannot wedge a download forever. This
/// layer never retries.
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
    metadata_timeout: std::time::Duration,
}

impl RegistryClient {
    /// Build a client from configuration.
    pub fn new(config: &UpstreamConfig) -> UpstreamResult<Self> {
        let client = reqwest::Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .pool_max_idle_per_host(config.pool_size)
            .read_timeout(config.tarball_idle_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.registry_url.trim_end_matches('/').to_string(),
            metadata_timeout: config.metadata_timeout(),
        })
    }

    /// The upstream URL of a package's metadata document.
    pub fn metadata_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    /// The upstream URL of a tarball.
    pub fn tarball_url(&self, name: &str, filename: &str) -> String {
        format!("{}/{}/-/{}", self.base_url, name, filename)
    }

    /// Fetch a package's metadata document.
    #[instrument(skip(self))]
    pub async fn fetch_metadata(&self, name: &str) -> UpstreamResult<serde_json::Value> {
        let url = self.metadata_url(name);
        let response = self
            .client
            .get(&url)
            .timeout(self.metadata_timeout)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            return Err(UpstreamError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let doc: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Protocol(format!("invalid metadata JSON: {e}")))?;
        if !doc.is_object() {
            return Err(UpstreamError::Protocol(format!(
                "metadata for {name} is not a JSON object"
            )));
        }
        Ok(doc)
    }

    /// Open a streaming tarball download.
    ///
    /// The returned stream yields body chunks as they arrive; mid-stream
    /// failures surface as stream items, not here.
    #[instrument(skip(self))]
    pub async fn fetch_tarball(&self, url: &str) -> UpstreamResult<TarballStream> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(UpstreamError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(Box::pin(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    fn client_for(server: &MockServer) -> RegistryClient {
        let config = UpstreamConfig {
            registry_url: server.url(""),
            ..Default::default()
        };
        RegistryClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn fetch_metadata_parses_document() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/lodash");
            then.status(200)
                .json_body(json!({ "name": "lodash", "versions": {} }));
        });

        let client = client_for(&server);
        let doc = client.fetch_metadata("lodash").await.unwrap();
        assert_eq!(doc["name"], "lodash");
        mock.assert();
    }

    #[tokio::test]
    async fn fetch_metadata_maps_404_to_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/ghost");
            then.status(404);
        });

        let client = client_for(&server);
        let err = client.fetch_metadata("ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn fetch_metadata_rejects_non_object_payload() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/weird");
            then.status(200).json_body(json!([1, 2, 3]));
        });

        let client = client_for(&server);
        let err = client.fetch_metadata("weird").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Protocol(_)));
    }

    #[tokio::test]
    async fn fetch_tarball_streams_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/left-pad/-/left-pad-1.3.0.tgz");
            then.status(200).body("tarball-bytes");
        });

        let client = client_for(&server);
        let url = client.tarball_url("left-pad", "left-pad-1.3.0.tgz");
        let mut stream = client.fetch_tarball(&url).await.unwrap();

        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"tarball-bytes");
    }

    #[tokio::test]
    async fn fetch_tarball_surfaces_server_error_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/bad/-/bad-1.0.0.tgz");
            then.status(503);
        });

        let client = client_for(&server);
        let url = client.tarball_url("bad", "bad-1.0.0.tgz");
        let err = match client.fetch_tarball(&url).await {
            Ok(_) => panic!("expected fetch_tarball to fail"),
            Err(e) => e,
        };
        assert!(matches!(err, UpstreamError::Status { status: 503, .. }));
    }
}
