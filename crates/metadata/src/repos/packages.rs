//! Package record repository.

use crate::error::MetadataResult;
use crate::models::PackageRow;
use async_trait::async_trait;

/// Package verification records, one per `(name, version)`.
#[async_trait]
pub trait PackageRepo: Send + Sync {
    /// Insert or overwrite the record for `(name, version)`.
    async fn upsert_package(&self, package: &PackageRow) -> MetadataResult<()>;

    /// Fetch the record for `(name, version)`.
    async fn get_package(&self, name: &str, version: &str)
    -> MetadataResult<Option<PackageRow>>;

    /// Cache keys of every tarball with a verified record.
    ///
    /// Used by the startup reclamation sweep: any on-disk tarball not in
    /// this set is eligible for deletion.
    async fn verified_cache_paths(&self) -> MetadataResult<Vec<String>>;
}
