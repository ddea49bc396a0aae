//! Route handlers.

pub mod chat;
pub mod ingest;
pub mod proxy;
pub mod stats;

pub use chat::{chat, hybrid_search};
pub use ingest::{force_scrape, precache, rebuild_embeddings};
pub use proxy::{package_metadata, package_tarball};
pub use stats::{health, security_stats, stats, vector_stats};
