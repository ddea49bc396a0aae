//! Single-flight download coordination and tee streaming.

use crate::verify;
use bytes::Bytes;
use futures::StreamExt;
use larder_metadata::models::PackageRow;
use larder_metadata::{MetadataStore, PackageRepo};
use larder_storage::{CacheDir, CacheWriter, StorageError};
use larder_upstream::registry::TarballStream;
use larder_upstream::{RegistryClient, UpstreamError};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::instrument;

/// Buffered body chunks between the disk pump and a client.
const CLIENT_CHANNEL_CAPACITY: usize = 64;

/// Cloneable terminal outcome of one download flight.
type Outcome = Result<(), String>;

/// The single-flight map: tarball filename to the flight's outcome slot.
type InflightMap = Arc<Mutex<HashMap<String, watch::Receiver<Option<Outcome>>>>>;

/// Errors establishing a download, before any bytes flow.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// How a tarball request is satisfied.
pub enum Delivery {
    /// The file is fully on disk; stream it from the cache.
    Cached,
    /// A live download owned by this request. Joiners never see this:
    /// they wait out the flight and then stream from disk.
    Live {
        /// Teed body chunks; an `Err` item terminates the client stream.
        body: mpsc::Receiver<std::io::Result<Bytes>>,
        /// Resolves once the flight completes, with its outcome.
        done: watch::Receiver<Option<Outcome>>,
    },
}

/// Single-flight coordinator for tarball downloads.
///
/// For any filename at most one upstream fetch is active; concurrent
/// requesters wait on the owner's flight and then stream from disk. The
/// in-flight map entry is removed on every exit path, including stream
/// errors and abandoned owners (a closed outcome channel is detected and
/// cleaned up by the next waiter).
pub struct DownloadCoordinator {
    cache: Arc<CacheDir>,
    registry: Arc<RegistryClient>,
    store: Arc<dyn MetadataStore>,
    inflight: InflightMap,
}

impl DownloadCoordinator {
    /// Create a coordinator.
    pub fn new(
        cache: Arc<CacheDir>,
        registry: Arc<RegistryClient>,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            cache,
            registry,
            store,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of in-flight downloads (test observability).
    pub async fn inflight_count(&self) -> usize {
        self.inflight.lock().await.len()
    }

    /// Satisfy a tarball request, either from disk or by starting (or
    /// waiting out) the single flight for this filename.
    #[instrument(skip(self))]
    pub async fn deliver(
        &self,
        package: &str,
        version: &str,
        filename: &str,
    ) -> Result<Delivery, DownloadError> {
        enum Role {
            Owner(watch::Sender<Option<Outcome>>),
            Waiter(watch::Receiver<Option<Outcome>>),
        }

        loop {
            // Fast path: a completed write is visible on disk.
            if self.cache.exists(filename).await? {
                return Ok(Delivery::Cached);
            }

            // Join an existing flight, or register our own.
            let role = {
                let mut inflight = self.inflight.lock().await;
                if let Some(rx) = inflight.get(filename) {
                    Role::Waiter(rx.clone())
                } else {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(filename.to_string(), rx);
                    Role::Owner(tx)
                }
            };

            match role {
                Role::Owner(tx) => {
                    return self.own_flight(package, version, filename, tx).await;
                }
                Role::Waiter(mut rx) => {
                    if rx.wait_for(|o| o.is_some()).await.is_err() {
                        // The owner vanished without resolving (cancelled
                        // before its pump started, or panicked). Drop the
                        // stale entry so the flight can be retried.
                        let mut inflight = self.inflight.lock().await;
                        if let Some(stored) = inflight.get(filename)
                            && stored.has_changed().is_err()
                        {
                            inflight.remove(filename);
                        }
                    }
                    // Outcome observed: re-check the disk. Present means
                    // the peer succeeded; absent means it failed (or a
                    // threat deleted the file) and we fall through to our
                    // own attempt.
                }
            }
        }
    }

    /// Run the flight we just registered.
    async fn own_flight(
        &self,
        package: &str,
        version: &str,
        filename: &str,
        tx: watch::Sender<Option<Outcome>>,
    ) -> Result<Delivery, DownloadError> {
        // The registration race: the prior owner may have finished
        // between our disk check and our map insertion.
        match self.cache.exists(filename).await {
            Ok(true) => {
                resolve_flight(&self.inflight, filename, &tx, Ok(())).await;
                return Ok(Delivery::Cached);
            }
            Ok(false) => {}
            Err(e) => {
                resolve_flight(&self.inflight, filename, &tx, Err(e.to_string())).await;
                return Err(e.into());
            }
        }

        // Open the upstream stream before committing to a response so an
        // immediate upstream failure maps to a real status code.
        let url = self.registry.tarball_url(package, filename);
        let stream = match self.registry.fetch_tarball(&url).await {
            Ok(stream) => stream,
            Err(e) => {
                resolve_flight(&self.inflight, filename, &tx, Err(e.to_string())).await;
                return Err(e.into());
            }
        };

        let writer = match self.cache.writer(filename).await {
            Ok(writer) => writer,
            Err(e) => {
                resolve_flight(&self.inflight, filename, &tx, Err(e.to_string())).await;
                return Err(e.into());
            }
        };

        let (body_tx, body_rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        let done = tx.subscribe();

        // The pump owns the disk write for the rest of the flight. It is
        // detached from this request: a client disconnect must not cost
        // the cache a nearly finished download.
        let flight = Flight {
            cache: self.cache.clone(),
            registry: self.registry.clone(),
            store: self.store.clone(),
            inflight: self.inflight.clone(),
            package: package.to_string(),
            version: version.to_string(),
            filename: filename.to_string(),
        };
        tokio::spawn(async move {
            let outcome = flight.pump(stream, writer, body_tx).await;
            resolve_flight(&flight.inflight, &flight.filename, &tx, outcome).await;
        });

        Ok(Delivery::Live {
            body: body_rx,
            done,
        })
    }
}

/// Drop the map entry, then resolve the flight for all waiters.
///
/// Removal comes first so a waiter that wakes on the outcome never finds
/// a stale entry; anyone arriving in between simply becomes the next
/// owner and hits the on-disk fast path.
async fn resolve_flight(
    inflight: &InflightMap,
    filename: &str,
    tx: &watch::Sender<Option<Outcome>>,
    outcome: Outcome,
) {
    inflight.lock().await.remove(filename);
    tx.send_replace(Some(outcome));
}

/// Everything one spawned flight needs to finish without its requester.
struct Flight {
    cache: Arc<CacheDir>,
    registry: Arc<RegistryClient>,
    store: Arc<dyn MetadataStore>,
    inflight: InflightMap,
    package: String,
    version: String,
    filename: String,
}

impl Flight {
    /// Tee the upstream body to disk and client, then verify and record.
    async fn pump(
        &self,
        mut stream: TarballStream,
        mut writer: CacheWriter,
        body_tx: mpsc::Sender<std::io::Result<Bytes>>,
    ) -> Outcome {
        let mut client_open = true;

        while let Some(item) = stream.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    // Partial file: remove it, terminate the client.
                    writer.abort().await;
                    let detail = format!("upstream stream failed mid-transfer: {e}");
                    if client_open {
                        let _ = body_tx.send(Err(std::io::Error::other(detail.clone()))).await;
                    }
                    tracing::warn!(
                        package = %self.package,
                        filename = %self.filename,
                        error = %e,
                        "tarball stream failed"
                    );
                    return Err(detail);
                }
            };

            if let Err(e) = writer.write(chunk.clone()).await {
                writer.abort().await;
                let detail = format!("cache write failed: {e}");
                if client_open {
                    let _ = body_tx.send(Err(std::io::Error::other(detail.clone()))).await;
                }
                tracing::error!(
                    package = %self.package,
                    filename = %self.filename,
                    error = %e,
                    "cache write failed"
                );
                return Err(detail);
            }

            // The disk writer always wins: a gone client only stops the
            // client half of the tee.
            if client_open && body_tx.send(Ok(chunk)).await.is_err() {
                client_open = false;
                tracing::debug!(
                    package = %self.package,
                    filename = %self.filename,
                    "client went away, disk write continues"
                );
            }
        }

        let size = match writer.finish().await {
            Ok(size) => size,
            Err(e) => {
                let detail = format!("cache finalize failed: {e}");
                if client_open {
                    let _ = body_tx.send(Err(std::io::Error::other(detail.clone()))).await;
                }
                return Err(detail);
            }
        };
        tracing::info!(
            package = %self.package,
            version = %self.version,
            filename = %self.filename,
            size,
            "tarball cached"
        );

        let report = verify::verify_download(
            &self.registry,
            &self.cache,
            &self.store,
            &self.package,
            &self.version,
            &self.filename,
        )
        .await;

        if report.threat {
            // The verifier already deleted the file and logged the event;
            // terminate the client abnormally so the download reads as
            // failed rather than silently poisoned.
            if client_open {
                let _ = body_tx
                    .send(Err(std::io::Error::other("integrity verification failed")))
                    .await;
            }
            return Err("integrity mismatch".to_string());
        }

        // Success and verification-failure both leave the file cached;
        // record what we know. A store failure here is operation-local.
        let now = OffsetDateTime::now_utc();
        let record = PackageRow {
            name: self.package.clone(),
            version: self.version.clone(),
            integrity: report.expected.as_ref().map(|i| i.as_str().to_string()),
            cached_path: self.filename.clone(),
            algorithm: report
                .expected
                .as_ref()
                .map(|i| i.algorithm())
                .unwrap_or_default()
                .as_str()
                .to_string(),
            verified: report.verified,
            verified_at: report.verified.then_some(now),
            created_at: now,
        };
        if let Err(e) = self.store.upsert_package(&record).await {
            tracing::error!(
                package = %self.package,
                version = %self.version,
                error = %e,
                "failed to persist package record"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use larder_core::config::UpstreamConfig;
    use larder_metadata::SqliteStore;

    async fn build_coordinator(
        upstream: &MockServer,
    ) -> (tempfile::TempDir, Arc<DownloadCoordinator>) {
        let temp = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheDir::new(temp.path().join("cache")).await.unwrap());
        let store: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(temp.path().join("larder.db")).await.unwrap(),
        );
        let registry = Arc::new(
            RegistryClient::new(&UpstreamConfig {
                registry_url: upstream.url(""),
                ..Default::default()
            })
            .unwrap(),
        );
        (temp, Arc::new(DownloadCoordinator::new(cache, registry, store)))
    }

    async fn drain(delivery: Delivery) -> (Vec<u8>, Option<Outcome>) {
        match delivery {
            Delivery::Cached => panic!("expected a live delivery"),
            Delivery::Live { mut body, mut done } => {
                let mut bytes = Vec::new();
                while let Some(item) = body.recv().await {
                    match item {
                        Ok(chunk) => bytes.extend_from_slice(&chunk),
                        Err(_) => break,
                    }
                }
                let outcome = done
                    .wait_for(|o| o.is_some())
                    .await
                    .ok()
                    .and_then(|o| o.clone());
                (bytes, outcome)
            }
        }
    }

    #[tokio::test]
    async fn upstream_404_fails_fast_and_clears_the_map() {
        let upstream = MockServer::start();
        upstream.mock(|when, then| {
            when.method(GET).path("/ghost/-/ghost-1.0.0.tgz");
            then.status(404);
        });

        let (_temp, coordinator) = build_coordinator(&upstream).await;
        let err = coordinator
            .deliver("ghost", "1.0.0", "ghost-1.0.0.tgz")
            .await
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, DownloadError::Upstream(_)));
        assert_eq!(coordinator.inflight_count().await, 0);
    }

    #[tokio::test]
    async fn failed_verification_still_serves_and_records_unverified() {
        let upstream = MockServer::start();
        upstream.mock(|when, then| {
            when.method(GET).path("/pkg/-/pkg-1.0.0.tgz");
            then.status(200).body("tarball-bytes");
        });
        // No metadata route: verification cannot resolve an integrity and
        // must log a failure, not a threat.

        let (_temp, coordinator) = build_coordinator(&upstream).await;
        let delivery = coordinator
            .deliver("pkg", "1.0.0", "pkg-1.0.0.tgz")
            .await
            .unwrap();
        let (bytes, outcome) = drain(delivery).await;

        assert_eq!(bytes, b"tarball-bytes");
        assert_eq!(outcome, Some(Ok(())));
        assert!(coordinator.cache.exists("pkg-1.0.0.tgz").await.unwrap());

        let record = coordinator
            .store
            .get_package("pkg", "1.0.0")
            .await
            .unwrap()
            .unwrap();
        assert!(!record.verified);
        assert_eq!(coordinator.inflight_count().await, 0);
    }

    #[tokio::test]
    async fn second_request_after_completion_reads_from_disk() {
        let upstream = MockServer::start();
        let tarball_mock = upstream.mock(|when, then| {
            when.method(GET).path("/pkg/-/pkg-1.0.0.tgz");
            then.status(200).body("tarball-bytes");
        });

        let (_temp, coordinator) = build_coordinator(&upstream).await;
        let delivery = coordinator
            .deliver("pkg", "1.0.0", "pkg-1.0.0.tgz")
            .await
            .unwrap();
        drain(delivery).await;

        match coordinator
            .deliver("pkg", "1.0.0", "pkg-1.0.0.tgz")
            .await
            .unwrap()
        {
            Delivery::Cached => {}
            Delivery::Live { .. } => panic!("expected a cached delivery"),
        }
        assert_eq!(tarball_mock.hits(), 1);
    }
}
