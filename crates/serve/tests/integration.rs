//! Integration tests for the distribution server

use axum::body::Body;
use axum::http::{Request, StatusCode};
use depot_catalog::UnitCatalog;
use depot_hash::{Digest, DigestAlgorithm};
use depot_net::{FetchConfig, Fetcher};
use depot_serve::router;
use depot_store::ContentStore;
use depot_sync::{IndexEntry, MirrorService, RepositoryIndex, StaticIndex};
use depot_types::MirrorPolicy;
use http_body_util::BodyExt;
use httpmock::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

fn fetcher() -> Fetcher {
    Fetcher::new(FetchConfig {
        max_retries: 1,
        initial_delay: Duration::from_millis(5),
        jitter_factor: 0.0,
        ..FetchConfig::default()
    })
    .unwrap()
}

async fn service() -> (TempDir, MirrorService) {
    let temp = TempDir::new().unwrap();
    let store = ContentStore::new(temp.path());
    store.init().await.unwrap();
    (temp, MirrorService::start(fetcher(), store, UnitCatalog::new()))
}

fn entry(path: &str, content: &[u8]) -> IndexEntry {
    IndexEntry {
        relative_path: path.to_string(),
        digest: Digest::compute(DigestAlgorithm::Sha256, content),
    }
}

async fn get_path(app: &axum::Router, path: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

#[tokio::test]
async fn synced_unit_is_served_with_identical_bytes() {
    let upstream = MockServer::start();
    let content: &[u8] = b"custommatcher javadoc sidecar";
    upstream.mock(|when, then| {
        when.method(GET)
            .path("/maven/custommatcher/1.0/custommatcher-1.0-javadoc.jar.sha1");
        then.status(200).body(content);
    });

    let (_temp, service) = service().await;
    let index: Arc<dyn RepositoryIndex> = Arc::new(StaticIndex::new(vec![entry(
        "custommatcher/1.0/custommatcher-1.0-javadoc.jar.sha1",
        content,
    )]));
    let remote = service
        .create_remote("fixtures", &upstream.url("/maven/"), MirrorPolicy::FullSync, index)
        .unwrap();
    service.trigger_sync(remote.id).await.unwrap();
    service.create_distribution("maven/maven", remote.id).unwrap();

    let app = router(service);
    let (status, body) = get_path(
        &app,
        "/maven/maven/custommatcher/1.0/custommatcher-1.0-javadoc.jar.sha1",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, content);
    // Served bytes hash identically to the upstream original
    assert_eq!(
        Digest::compute(DigestAlgorithm::Sha256, &body),
        Digest::compute(DigestAlgorithm::Sha256, content)
    );
}

#[tokio::test]
async fn content_length_is_set() {
    let upstream = MockServer::start();
    let content: &[u8] = b"sized payload";
    upstream.mock(|when, then| {
        when.method(GET).path("/maven/a/1.0/a.jar");
        then.status(200).body(content);
    });

    let (_temp, service) = service().await;
    let index: Arc<dyn RepositoryIndex> =
        Arc::new(StaticIndex::new(vec![entry("a/1.0/a.jar", content)]));
    let remote = service
        .create_remote("fixtures", &upstream.url("/maven/"), MirrorPolicy::FullSync, index)
        .unwrap();
    service.trigger_sync(remote.id).await.unwrap();
    service.create_distribution("maven/maven", remote.id).unwrap();

    let app = router(service);
    let response = app
        .oneshot(
            Request::get("/maven/maven/a/1.0/a.jar")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response
            .headers()
            .get(axum::http::header::CONTENT_LENGTH)
            .unwrap(),
        &content.len().to_string()
    );
}

#[tokio::test]
async fn unknown_paths_are_404() {
    let upstream = MockServer::start();
    let (_temp, service) = service().await;
    let index: Arc<dyn RepositoryIndex> = Arc::new(StaticIndex::new(Vec::new()));
    let remote = service
        .create_remote("fixtures", &upstream.url("/maven/"), MirrorPolicy::FullSync, index)
        .unwrap();
    service.create_distribution("maven/maven", remote.id).unwrap();

    let app = router(service);

    // Path outside any distribution
    let (status, _) = get_path(&app, "/elsewhere/thing.jar").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Path inside the distribution but not mirrored; full-sync miss is terminal
    let (status, _) = get_path(&app, "/maven/maven/never/1.0/never.jar").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn on_demand_miss_mirrors_then_serves() {
    let upstream = MockServer::start();
    let content: &[u8] = b"fetched on first request";
    let mock = upstream.mock(|when, then| {
        when.method(GET).path("/maven/lazy/1.0/lazy.jar");
        then.status(200).body(content);
    });

    let (_temp, service) = service().await;
    let index: Arc<dyn RepositoryIndex> =
        Arc::new(StaticIndex::new(vec![entry("lazy/1.0/lazy.jar", content)]));
    let remote = service
        .create_remote("lazy", &upstream.url("/maven/"), MirrorPolicy::OnDemand, index)
        .unwrap();
    service.create_distribution("maven/maven", remote.id).unwrap();

    let app = router(service);

    let (status, body) = get_path(&app, "/maven/maven/lazy/1.0/lazy.jar").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, content);

    // Second request is served from the mirror, not upstream
    let (status, body) = get_path(&app, "/maven/maven/lazy/1.0/lazy.jar").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, content);
    mock.assert_hits(1);
}

#[tokio::test]
async fn corrupted_upstream_unit_never_becomes_visible() {
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(GET).path("/maven/evil/1.0/evil.jar");
        then.status(200).body("tampered bytes");
    });

    let (_temp, service) = service().await;
    // Index declares a digest the served bytes will not match
    let index: Arc<dyn RepositoryIndex> = Arc::new(StaticIndex::new(vec![entry(
        "evil/1.0/evil.jar",
        b"declared bytes",
    )]));
    let remote = service
        .create_remote("evil", &upstream.url("/maven/"), MirrorPolicy::OnDemand, index)
        .unwrap();
    service.create_distribution("maven/maven", remote.id).unwrap();

    let app = router(service);
    let (status, _) = get_path(&app, "/maven/maven/evil/1.0/evil.jar").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_blob_is_an_inconsistency_not_a_404() {
    let upstream = MockServer::start();
    let content: &[u8] = b"soon to vanish";
    upstream.mock(|when, then| {
        when.method(GET).path("/maven/a/1.0/a.jar");
        then.status(200).body(content);
    });

    let (_temp, service) = service().await;
    let index: Arc<dyn RepositoryIndex> =
        Arc::new(StaticIndex::new(vec![entry("a/1.0/a.jar", content)]));
    let remote = service
        .create_remote("fixtures", &upstream.url("/maven/"), MirrorPolicy::FullSync, index)
        .unwrap();
    service.trigger_sync(remote.id).await.unwrap();
    let distribution = service.create_distribution("maven/maven", remote.id).unwrap();

    // Rip the blob out from under the catalog
    let unit = service
        .catalog()
        .resolve(distribution.repository_id, "a/1.0/a.jar")
        .unwrap();
    let blob = service.store().blob_path(&unit.store_key).unwrap();
    tokio::fs::remove_file(blob).await.unwrap();

    let app = router(service);
    let (status, _) = get_path(&app, "/maven/maven/a/1.0/a.jar").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
