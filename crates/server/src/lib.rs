//! HTTP API server for the Larder registry proxy.
//!
//! This crate provides the HTTP surface:
//! - Registry proxy routes (metadata documents, tarball streaming)
//! - Single-flight download coordination with tee streaming
//! - Integrity verification and the audit trail
//! - Documentation Q&A and hybrid search routes
//! - Stats and health endpoints

pub mod downloads;
pub mod error;
pub mod handlers;
pub mod reclaim;
pub mod routes;
pub mod state;
pub mod verify;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
