//! Outbound HTTP clients for Larder.
//!
//! Two collaborators live behind TLS here:
//! - the public package registry (metadata documents, tarball streams)
//! - the model backend (embeddings, generation)
//!
//! Both clients reuse pooled connections and carry explicit per-operation
//! timeouts. Neither retries; retry policy belongs to callers.

pub mod error;
pub mod model;
pub mod registry;

pub use error::{UpstreamError, UpstreamResult};
pub use model::ModelClient;
pub use registry::RegistryClient;
