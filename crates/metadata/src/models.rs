//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// Package records
// =============================================================================

/// A cached tarball's verification record.
///
/// One row per `(name, version)`; a re-download overwrites the row after
/// successful re-verification.
#[derive(Debug, Clone, FromRow)]
pub struct PackageRow {
    pub name: String,
    pub version: String,
    /// Upstream-declared integrity at verification time, canonical form.
    pub integrity: Option<String>,
    /// Cache key of the tarball file (its filename).
    pub cached_path: String,
    /// Digest algorithm used for verification.
    pub algorithm: String,
    pub verified: bool,
    pub verified_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Documentation chunks
// =============================================================================

/// A retrieval unit of a package's documentation.
///
/// `embedding` is a little-endian f32 blob; absent when the embedding
/// backend was unavailable at ingest time. Such chunks remain searchable
/// lexically.
#[derive(Debug, Clone, FromRow)]
pub struct ChunkRow {
    pub package_name: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Option<Vec<u8>>,
    pub created_at: OffsetDateTime,
}

/// Aggregate counts over the chunk store.
#[derive(Debug, Clone, Default)]
pub struct ChunkStats {
    pub total_chunks: u64,
    pub chunks_with_embedding: u64,
    pub packages: Vec<String>,
}

// =============================================================================
// TTL caches
// =============================================================================

/// Content-addressed embedding memoization entry (1 h TTL).
#[derive(Debug, Clone, FromRow)]
pub struct EmbeddingCacheRow {
    pub text_digest: String,
    pub embedding: Vec<u8>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// Question-answer memoization entry (24 h TTL).
#[derive(Debug, Clone, FromRow)]
pub struct ResponseCacheRow {
    pub question_digest: String,
    pub answer: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

// =============================================================================
// Security events
// =============================================================================

/// Verification outcome kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Success,
    ThreatDetected,
    Failure,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ThreatDetected => "threat_detected",
            Self::Failure => "failure",
        }
    }
}

/// Append-only verification audit record.
#[derive(Debug, Clone, FromRow)]
pub struct SecurityEventRow {
    pub event_id: i64,
    pub package_name: String,
    pub version: String,
    pub kind: String,
    pub observed_digest: Option<String>,
    pub expected_digest: Option<String>,
    pub details: Option<String>,
    pub created_at: OffsetDateTime,
}

/// A security event before insertion (the id is assigned by the store).
#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub package_name: String,
    pub version: String,
    pub kind: EventKind,
    pub observed_digest: Option<String>,
    pub expected_digest: Option<String>,
    pub details: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Aggregate counts over the event log.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventTotals {
    pub total: u64,
    pub success: u64,
    pub threats_detected: u64,
    pub failures: u64,
}
