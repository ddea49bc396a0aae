//! Core domain types and shared logic for the Larder registry proxy.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Integrity strings and streaming digest computation
//! - Documentation text chunking
//! - Cosine similarity over embedding vectors
//! - Tarball filename parsing
//! - Metadata document URL rewriting
//! - Application configuration

pub mod chunk;
pub mod config;
pub mod error;
pub mod hash;
pub mod integrity;
pub mod rewrite;
pub mod similarity;
pub mod tarball;

pub use chunk::chunk_text;
pub use error::{Error, Result};
pub use hash::{IntegrityHasher, digest_file};
pub use integrity::{HashAlgorithm, IntegrityString};
pub use rewrite::rewrite_tarball_urls;
pub use similarity::cosine_similarity;
pub use tarball::parse_tarball_filename;

/// Default chunk window size in code units.
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Default overlap between adjacent chunk windows, in code units.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Documentation text is truncated to this many code units before chunking.
pub const MAX_DOC_CHARS: usize = 5000;
