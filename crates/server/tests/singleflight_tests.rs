//! Single-flight download coordination tests.

mod common;

use axum::http::StatusCode;
use common::{TestServer, body_bytes, metadata_doc, sha512_integrity};
use httpmock::Method::GET;
use larder_metadata::{EventRepo, PackageRepo};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_induce_one_upstream_fetch() {
    let server = TestServer::new().await;
    let registry_url = server.upstream.url("");
    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();

    server.upstream.mock(|when, then| {
        when.method(GET).path("/left-pad");
        then.status(200).json_body(metadata_doc(
            &registry_url,
            "left-pad",
            "1.3.0",
            Some(&sha512_integrity(&payload)),
            None,
        ));
    });
    let tarball_mock = server.upstream.mock(|when, then| {
        when.method(GET).path("/left-pad/-/left-pad-1.3.0.tgz");
        // The delay keeps the flight open long enough for every request
        // to pile onto the same entry.
        then.status(200)
            .delay(Duration::from_millis(150))
            .body(payload.clone());
    });

    let mut handles = Vec::new();
    for _ in 0..5 {
        let router = server.router.clone();
        handles.push(tokio::spawn(async move {
            use tower::ServiceExt;
            let request = axum::http::Request::builder()
                .uri("/left-pad/-/left-pad-1.3.0.tgz")
                .header("host", "test-host")
                .body(axum::body::Body::empty())
                .unwrap();
            let response = router.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            body_bytes(response).await
        }));
    }

    for handle in handles {
        let body = handle.await.unwrap();
        assert_eq!(body, payload, "every client sees identical bytes");
    }

    // Exactly one upstream GET despite five concurrent requests.
    assert_eq!(tarball_mock.hits(), 1);

    // One file write, one verified record, one success event.
    assert!(server.state.cache.exists("left-pad-1.3.0.tgz").await.unwrap());
    let record = server
        .state
        .store
        .get_package("left-pad", "1.3.0")
        .await
        .unwrap()
        .unwrap();
    assert!(record.verified);

    let totals = server.state.store.event_totals().await.unwrap();
    assert_eq!(totals.total, 1);
    assert_eq!(totals.success, 1);

    // The single-flight map never leaks entries. The owner's flight
    // resolves moments after its body closes, so poll briefly.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if server.state.downloads.inflight_count().await == 0 {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("single-flight map still holds entries");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_requests_reuse_the_cached_file() {
    let server = TestServer::new().await;
    let registry_url = server.upstream.url("");
    let payload = b"tiny payload".to_vec();

    server.upstream.mock(|when, then| {
        when.method(GET).path("/tiny");
        then.status(200).json_body(metadata_doc(
            &registry_url,
            "tiny",
            "2.0.0",
            Some(&sha512_integrity(&payload)),
            None,
        ));
    });
    let tarball_mock = server.upstream.mock(|when, then| {
        when.method(GET).path("/tiny/-/tiny-2.0.0.tgz");
        then.status(200).body(payload.clone());
    });

    for _ in 0..3 {
        let response = server.get("/tiny/-/tiny-2.0.0.tgz").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, payload);
    }

    assert_eq!(tarball_mock.hits(), 1);
}
