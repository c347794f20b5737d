//! End-to-end mirror scenarios
//!
//! Drives the whole pipeline the way the host framework would: register a
//! remote, create a distribution, sync (or rely on on-demand fetching),
//! and verify that a unit downloaded through the local distribution is
//! byte-identical to the same unit fetched directly from upstream.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use depot_catalog::UnitCatalog;
use depot_hash::{Digest, DigestAlgorithm};
use depot_net::{FetchConfig, Fetcher};
use depot_serve::router;
use depot_store::ContentStore;
use depot_sync::{ManifestIndex, MirrorService, RepositoryIndex};
use depot_types::MirrorPolicy;
use http_body_util::BodyExt;
use httpmock::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;

const UNIT_PATH: &str = "custommatcher/1.0/custommatcher-1.0-javadoc.jar.sha1";
const UNIT_BYTES: &[u8] = b"5c3f42b9e37af3fe6d9a4f1a7eab1bbdf2f7e7ac";

fn fetcher() -> Fetcher {
    Fetcher::new(FetchConfig {
        max_retries: 1,
        initial_delay: Duration::from_millis(5),
        jitter_factor: 0.0,
        ..FetchConfig::default()
    })
    .unwrap()
}

/// Upstream fixture repository: a manifest plus one content unit
fn mock_upstream(server: &MockServer) {
    let digest = Digest::compute(DigestAlgorithm::Sha1, UNIT_BYTES);
    server.mock(|when, then| {
        when.method(GET).path("/maven/.depot-manifest");
        then.status(200).body(format!("{digest}  {UNIT_PATH}\n"));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("/maven/{UNIT_PATH}"));
        then.status(200).body(UNIT_BYTES);
    });
}

async fn mirror(policy: MirrorPolicy, server: &MockServer) -> (TempDir, MirrorService) {
    let temp = TempDir::new().unwrap();
    let store = ContentStore::new(temp.path());
    store.init().await.unwrap();
    let service = MirrorService::start(fetcher(), store, UnitCatalog::new());

    let base_url = Url::parse(&server.url("/maven/")).unwrap();
    let index: Arc<dyn RepositoryIndex> = Arc::new(ManifestIndex::new(
        service.orchestrator().fetcher().clone(),
        base_url,
    ));
    let remote = service
        .create_remote("fixtures", &server.url("/maven/"), policy, index)
        .unwrap();
    service.create_distribution("maven/maven", remote.id).unwrap();

    if policy == MirrorPolicy::FullSync {
        let result = service.trigger_sync(remote.id).await.unwrap();
        assert_eq!(result.units_added, 1);
        assert_eq!(result.units_failed, 0);
    }

    (temp, service)
}

async fn fetch_via_distribution(service: MirrorService) -> (StatusCode, Vec<u8>) {
    let app = router(service);
    let response = app
        .oneshot(
            Request::get(format!("/maven/maven/{UNIT_PATH}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

#[tokio::test]
async fn synced_mirror_serves_bytes_identical_to_upstream() {
    let server = MockServer::start();
    mock_upstream(&server);

    let (_temp, service) = mirror(MirrorPolicy::FullSync, &server).await;

    // Fetch the unit directly from the fixture repository
    let direct = fetcher()
        .fetch(&Url::parse(&server.url("/maven/")).unwrap(), UNIT_PATH)
        .await
        .unwrap();
    let direct_sha256 = Digest::compute(DigestAlgorithm::Sha256, &direct);

    // And through the local distribution
    let (status, mirrored) = fetch_via_distribution(service).await;
    assert_eq!(status, StatusCode::OK);

    let mirrored_sha256 = Digest::compute(DigestAlgorithm::Sha256, &mirrored);
    assert_eq!(direct_sha256, mirrored_sha256);
}

#[tokio::test]
async fn on_demand_mirror_fetches_on_first_request() {
    let server = MockServer::start();
    mock_upstream(&server);

    let (_temp, service) = mirror(MirrorPolicy::OnDemand, &server).await;

    // Nothing mirrored yet
    assert!(service.catalog().is_empty());

    let (status, mirrored) = fetch_via_distribution(service.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mirrored, UNIT_BYTES);

    // The unit is now cataloged, with the filename query the host uses
    let hits = service
        .catalog()
        .units_by_filename("custommatcher-1.0-javadoc.jar.sha1");
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn deleting_remotes_respects_shared_content() {
    let server = MockServer::start();
    mock_upstream(&server);

    let temp = TempDir::new().unwrap();
    let store = ContentStore::new(temp.path());
    store.init().await.unwrap();
    let service = MirrorService::start(fetcher(), store.clone(), UnitCatalog::new());

    let base_url = Url::parse(&server.url("/maven/")).unwrap();
    let mut remotes = Vec::new();
    for name in ["primary", "secondary"] {
        let index: Arc<dyn RepositoryIndex> = Arc::new(ManifestIndex::new(
            service.orchestrator().fetcher().clone(),
            base_url.clone(),
        ));
        let remote = service
            .create_remote(name, &server.url("/maven/"), MirrorPolicy::FullSync, index)
            .unwrap();
        service.trigger_sync(remote.id).await.unwrap();
        remotes.push(remote);
    }

    let key = depot_types::StoreKey(
        Digest::compute(DigestAlgorithm::Sha256, UNIT_BYTES).to_hex(),
    );
    assert_eq!(store.ref_count(&key), 2);

    service.delete_remote(remotes[0].id).await.unwrap();
    assert!(store.contains(&key).await, "shared bytes must survive");

    service.delete_remote(remotes[1].id).await.unwrap();
    assert!(
        !store.contains(&key).await,
        "last reference deletion removes the bytes"
    );
}
