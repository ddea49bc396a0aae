//! Security event repository.

use crate::error::MetadataResult;
use crate::models::{EventTotals, NewSecurityEvent, SecurityEventRow};
use async_trait::async_trait;

/// The append-only verification audit log.
#[async_trait]
pub trait EventRepo: Send + Sync {
    /// Append one event. Events are never updated or deleted.
    async fn append_event(&self, event: &NewSecurityEvent) -> MetadataResult<()>;

    /// The most recent `limit` events, newest first.
    async fn recent_events(&self, limit: u32) -> MetadataResult<Vec<SecurityEventRow>>;

    /// Aggregate counts by kind.
    async fn event_totals(&self) -> MetadataResult<EventTotals>;
}
