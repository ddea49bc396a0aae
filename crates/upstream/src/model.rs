//! Client for the embedding and generation backend.

use crate::error::{UpstreamError, UpstreamResult};
use larder_core::config::ModelConfig;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Client for an Ollama-style model backend.
///
/// Two endpoints are used: `/api/embeddings` for embedding vectors and
/// `/api/generate` for non-streaming text generation. Requests share the
/// configured timeout; there are no retries. A failed embedding is a
/// degraded-mode signal to callers, not something to hammer the backend
/// over.
pub struct ModelClient {
    client: reqwest::Client,
    base_url: String,
    embedding_model: String,
    generation_model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl ModelClient {
    /// Build a client from configuration.
    pub fn new(config: &ModelConfig) -> UpstreamResult<Self> {
        let client = reqwest::Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
        })
    }

    /// The configured embedding model identifier.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Compute an embedding vector for one text.
    #[instrument(skip(self, text), fields(chars = text.len()))]
    pub async fn embed(&self, text: &str) -> UpstreamResult<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbeddingRequest {
                model: &self.embedding_model,
                prompt: text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Protocol(format!("invalid embedding response: {e}")))?;
        if body.embedding.is_empty() {
            return Err(UpstreamError::Protocol(
                "embedding response carried an empty vector".to_string(),
            ));
        }
        Ok(body.embedding)
    }

    /// Generate an answer for a prompt, non-streaming.
    #[instrument(skip(self, prompt), fields(chars = prompt.len()))]
    pub async fn generate(&self, prompt: &str) -> UpstreamResult<String> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.generation_model,
                prompt,
                stream: false,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Protocol(format!("invalid generate response: {e}")))?;
        Ok(body.response)
    }
}
