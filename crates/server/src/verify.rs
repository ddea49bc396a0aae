//! Integrity verification of downloaded tarballs.

use larder_core::{IntegrityString, digest_file};
use larder_metadata::models::{EventKind, NewSecurityEvent};
use larder_metadata::{EventRepo, MetadataStore};
use larder_storage::CacheDir;
use larder_upstream::RegistryClient;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::instrument;

/// Outcome of one verification attempt.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// The file's digest equals the upstream-declared integrity.
    pub verified: bool,
    /// The digests differed; the on-disk file has been deleted.
    pub threat: bool,
    /// Upstream-declared integrity, canonical form, when resolvable.
    pub expected: Option<IntegrityString>,
    /// Locally computed digest, when the file was readable.
    pub observed: Option<IntegrityString>,
    /// Failure detail for the non-threat error paths.
    pub error: Option<String>,
    pub elapsed_ms: u128,
}

/// What the fallible portion of verification resolves to.
enum Comparison {
    Match {
        expected: IntegrityString,
        observed: IntegrityString,
    },
    Mismatch {
        expected: IntegrityString,
        observed: IntegrityString,
    },
}

/// Verify a downloaded tarball against the upstream-declared integrity.
///
/// Every call writes exactly one security event: `success` on a digest
/// match, `threat_detected` on a mismatch (the file is deleted first),
/// `failure` on any exceptional path (upstream unreachable, missing
/// integrity, unreadable file). This function never propagates an error;
/// threats must not be turned into silent exceptions.
#[instrument(skip(registry, cache, store))]
pub async fn verify_download(
    registry: &RegistryClient,
    cache: &CacheDir,
    store: &Arc<dyn MetadataStore>,
    package: &str,
    version: &str,
    filename: &str,
) -> VerifyReport {
    let started = Instant::now();
    let outcome = compare_digests(registry, cache, package, version, filename).await;
    let elapsed_ms = started.elapsed().as_millis();
    let now = OffsetDateTime::now_utc();

    let (report, event) = match outcome {
        Ok(Comparison::Match { expected, observed }) => {
            tracing::info!(package, version, elapsed_ms, "integrity verified");
            (
                VerifyReport {
                    verified: true,
                    threat: false,
                    expected: Some(expected.clone()),
                    observed: Some(observed.clone()),
                    error: None,
                    elapsed_ms,
                },
                NewSecurityEvent {
                    package_name: package.to_string(),
                    version: version.to_string(),
                    kind: EventKind::Success,
                    observed_digest: Some(observed.as_str().to_string()),
                    expected_digest: Some(expected.as_str().to_string()),
                    details: None,
                    created_at: now,
                },
            )
        }
        Ok(Comparison::Mismatch { expected, observed }) => {
            tracing::error!(
                package,
                version,
                expected = %expected,
                observed = %observed,
                "integrity mismatch, deleting cached tarball"
            );
            if let Err(e) = cache.delete(filename).await {
                tracing::error!(filename, error = %e, "failed to delete corrupt tarball");
            }
            (
                VerifyReport {
                    verified: false,
                    threat: true,
                    expected: Some(expected.clone()),
                    observed: Some(observed.clone()),
                    error: None,
                    elapsed_ms,
                },
                NewSecurityEvent {
                    package_name: package.to_string(),
                    version: version.to_string(),
                    kind: EventKind::ThreatDetected,
                    observed_digest: Some(observed.as_str().to_string()),
                    expected_digest: Some(expected.as_str().to_string()),
                    details: Some("computed digest does not match upstream integrity".to_string()),
                    created_at: now,
                },
            )
        }
        Err(detail) => {
            tracing::warn!(package, version, detail = %detail, "verification failed");
            (
                VerifyReport {
                    verified: false,
                    threat: false,
                    expected: None,
                    observed: None,
                    error: Some(detail.clone()),
                    elapsed_ms,
                },
                NewSecurityEvent {
                    package_name: package.to_string(),
                    version: version.to_string(),
                    kind: EventKind::Failure,
                    observed_digest: None,
                    expected_digest: None,
                    details: Some(detail),
                    created_at: now,
                },
            )
        }
    };

    if let Err(e) = store.append_event(&event).await {
        tracing::error!(package, version, error = %e, "failed to persist security event");
    }

    report
}

/// Fetch the declared integrity, hash the file, and compare.
///
/// Protocol and transport problems come back as `Err(detail)`; only a
/// completed comparison distinguishes a threat from a failure.
async fn compare_digests(
    registry: &RegistryClient,
    cache: &CacheDir,
    package: &str,
    version: &str,
    filename: &str,
) -> Result<Comparison, String> {
    let doc = registry
        .fetch_metadata(package)
        .await
        .map_err(|e| format!("metadata fetch failed: {e}"))?;

    let declared = doc
        .get("versions")
        .and_then(|v| v.get(version))
        .and_then(|v| v.get("dist"))
        .and_then(|d| d.get("integrity"))
        .and_then(|i| i.as_str())
        .ok_or_else(|| format!("upstream declares no integrity for {package}@{version}"))?;

    let expected = IntegrityString::parse(declared)
        .map_err(|e| format!("unparseable upstream integrity: {e}"))?;

    let path = cache.root().join(filename);
    let observed = digest_file(&path, expected.algorithm())
        .await
        .map_err(|e| format!("digest of {filename} failed: {e}"))?;

    if observed == expected {
        Ok(Comparison::Match { expected, observed })
    } else {
        Ok(Comparison::Mismatch { expected, observed })
    }
}
