//! Documentation Q&A routes.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// How many chunks feed the answer prompt.
const CHAT_TOP_K: usize = 5;

/// How many results the search route returns.
const SEARCH_TOP_K: usize = 5;

/// Canned answer when retrieval finds nothing to ground on.
const NO_CONTEXT_ANSWER: &str =
    "No documentation found for that question. Try asking about a package that has been cached.";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub answer: String,
    /// Package name of the top chunk, `"cache"` on a response-cache hit,
    /// or null when no context was found.
    pub source: Option<String>,
    pub response_time_ms: u128,
}

#[derive(Debug, Deserialize)]
pub struct HybridSearchRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub package_name: String,
    pub chunk_index: i64,
    pub text: String,
    pub vector_score: f32,
    pub lexical_score: f32,
    pub combined_score: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridSearchResponse {
    pub results: Vec<SearchHit>,
}

/// POST /api/chat - retrieval-augmented answer over cached docs.
///
/// LLM errors never surface as HTTP failures; the answer field carries
/// an error message and the source stays null.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let started = Instant::now();
    let question = request.question.trim().to_string();

    if question.is_empty() {
        return Ok(Json(ChatResponse {
            answer: NO_CONTEXT_ANSWER.to_string(),
            source: None,
            response_time_ms: started.elapsed().as_millis(),
        }));
    }

    if let Some(answer) = state.engine.cached_answer(&question).await? {
        return Ok(Json(ChatResponse {
            answer,
            source: Some("cache".to_string()),
            response_time_ms: started.elapsed().as_millis(),
        }));
    }

    let chunks = state.engine.search(&question, CHAT_TOP_K).await?;
    if chunks.is_empty() {
        return Ok(Json(ChatResponse {
            answer: NO_CONTEXT_ANSWER.to_string(),
            source: None,
            response_time_ms: started.elapsed().as_millis(),
        }));
    }

    let source = chunks[0].package_name.clone();
    let prompt = build_prompt(&question, &chunks);

    match state.model.generate(&prompt).await {
        Ok(answer) => {
            state.engine.store_answer(&question, &answer).await?;
            Ok(Json(ChatResponse {
                answer,
                source: Some(source),
                response_time_ms: started.elapsed().as_millis(),
            }))
        }
        Err(e) => {
            tracing::warn!(error = %e, "generation failed");
            Ok(Json(ChatResponse {
                answer: format!("Answer generation failed: {e}"),
                source: None,
                response_time_ms: started.elapsed().as_millis(),
            }))
        }
    }
}

/// POST /api/hybrid-search - ranked chunks with their scores.
pub async fn hybrid_search(
    State(state): State<AppState>,
    Json(request): Json<HybridSearchRequest>,
) -> ApiResult<Json<HybridSearchResponse>> {
    let results = state
        .engine
        .search(request.query.trim(), SEARCH_TOP_K)
        .await?
        .into_iter()
        .map(|c| SearchHit {
            package_name: c.package_name,
            chunk_index: c.chunk_index,
            text: c.text,
            vector_score: c.vector_score,
            lexical_score: c.lexical_score,
            combined_score: c.combined_score,
        })
        .collect();

    Ok(Json(HybridSearchResponse { results }))
}

/// Assemble the grounding prompt from ranked chunks.
fn build_prompt(question: &str, chunks: &[larder_rag::ScoredChunk]) -> String {
    let mut prompt = String::from(
        "You are a documentation assistant for a LAN package registry. \
         Answer the question using only the context below.\n\nContext:\n",
    );
    for chunk in chunks {
        prompt.push_str(&format!("[{}]\n{}\n\n", chunk.package_name, chunk.text));
    }
    prompt.push_str(&format!("Question: {question}\nAnswer:"));
    prompt
}
