//! Metadata store abstraction and SQLite implementation for Larder.
//!
//! This crate provides the control-plane data model:
//! - Package records and verification state
//! - Documentation chunks with optional embeddings
//! - Embedding and response caches with TTL expiry
//! - The append-only security event log

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use repos::{CacheRepo, ChunkRepo, EventRepo, PackageRepo};
pub use store::{MetadataStore, SqliteStore};

use std::path::Path;
use std::sync::Arc;

/// Create a metadata store from a database path.
pub async fn open(path: impl AsRef<Path>) -> MetadataResult<Arc<dyn MetadataStore>> {
    let store = SqliteStore::new(path).await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}
