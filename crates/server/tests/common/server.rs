//! Server test harness.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::Response as AxumResponse;
use httpmock::MockServer;
use larder_core::config::AppConfig;
use larder_metadata::{MetadataStore, SqliteStore};
use larder_server::{AppState, create_router};
use larder_storage::CacheDir;
use larder_upstream::{ModelClient, RegistryClient};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: Router,
    pub state: AppState,
    pub upstream: MockServer,
    pub model: MockServer,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server wired to fresh upstream and model mocks.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("failed to create temp directory");
        let upstream = MockServer::start();
        let model = MockServer::start();

        let mut config = AppConfig::for_testing();
        config.cache.dir = temp_dir.path().join("cache");
        config.metadata.path = temp_dir.path().join("larder.db");
        config.upstream.registry_url = upstream.url("");
        config.model.base_url = model.url("");
        modifier(&mut config);

        let cache = Arc::new(
            CacheDir::new(&config.cache.dir)
                .await
                .expect("failed to create cache directory"),
        );
        let store: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&config.metadata.path)
                .await
                .expect("failed to create metadata store"),
        );
        let registry =
            Arc::new(RegistryClient::new(&config.upstream).expect("failed to build registry client"));
        let model_client =
            Arc::new(ModelClient::new(&config.model).expect("failed to build model client"));

        let state = AppState::new(config, cache, store, registry, model_client);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            upstream,
            model,
            _temp_dir: temp_dir,
        }
    }

    /// Issue a GET request.
    pub async fn get(&self, path: &str) -> AxumResponse {
        self.get_with_host(path, "test-host").await
    }

    /// Issue a GET request with an explicit Host header.
    pub async fn get_with_host(&self, path: &str, host: &str) -> AxumResponse {
        let request = Request::builder()
            .uri(path)
            .header("host", host)
            .body(Body::empty())
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Issue a POST request with a JSON body.
    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> AxumResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("host", "test-host")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Collect a response body, panicking on stream errors.
#[allow(dead_code)]
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body stream failed")
        .to_vec()
}

/// Collect a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("body is not JSON")
}

/// Assert a status and return the JSON body.
#[allow(dead_code)]
pub async fn expect_json(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status, "unexpected status");
    body_json(response).await
}
