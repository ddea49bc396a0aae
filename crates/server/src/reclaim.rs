//! Startup reclamation of stale cache entries.

use larder_metadata::{MetadataStore, PackageRepo};
use larder_storage::CacheDir;
use std::collections::HashSet;
use std::sync::Arc;

/// What a reclamation sweep removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReclaimStats {
    pub temp_files_removed: usize,
    pub tarballs_removed: usize,
}

/// Remove partial downloads left by a previous server instance.
///
/// Interrupted flights leave temp files, and an interrupted verification
/// can leave a tarball with no verified package record. Both are removed:
/// any tarball lacking a verified record is eligible for deletion, since
/// a later request will fetch and verify it afresh.
pub async fn reclaim_cache(
    cache: &Arc<CacheDir>,
    store: &Arc<dyn MetadataStore>,
) -> anyhow::Result<ReclaimStats> {
    let mut stats = ReclaimStats {
        temp_files_removed: cache.sweep_temp_files().await?,
        ..Default::default()
    };

    let verified: HashSet<String> = store.verified_cache_paths().await?.into_iter().collect();
    for filename in cache.list(Some(".tgz")).await? {
        if verified.contains(&filename) {
            continue;
        }
        match cache.delete(&filename).await {
            Ok(()) => {
                tracing::warn!(filename = %filename, "removed tarball without a verified record");
                stats.tarballs_removed += 1;
            }
            Err(e) => {
                tracing::error!(filename = %filename, error = %e, "failed to remove stale tarball");
            }
        }
    }

    Ok(stats)
}
