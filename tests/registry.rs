use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use nscr::config::Config;
use nscr::db::Db;
use nscr::http::{self, AppState};
use nscr::store::Store;

fn disk_config(database_path: String) -> Config {
    Config {
        database_path,
        ..test_config()
    }
}

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 7000,
        database_path: "./data/".to_string(),
        db_min_connections: 1,
        db_max_connections: 1,
        registry_url: Some("http://registry.test".to_string()),
        gc_enabled: false,
        gc_interval_hours: 24,
        max_upload_size_mb: 1024,
        chunk_size_mb: 10,
        auth_enabled: false,
        auth_username: None,
        auth_password: None,
        shutdown_endpoint_enabled: false,
        session_ttl_hours: 1,
        manifest_require_blobs: true,
    }
}

async fn test_app() -> axum::Router {
    let (app, _store) = test_app_and_store().await;
    app
}

async fn test_app_and_store() -> (axum::Router, Store) {
    let db = Db::connect_in_memory().await.unwrap();
    let store = Store::new(db);
    let config = Arc::new(test_config());
    let app = http::router(AppState {
        store: store.clone(),
        config,
        healthy: Arc::new(AtomicBool::new(true)),
    });
    (app, store)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

#[tokio::test]
async fn version_probe_reports_api_version() {
    let app = test_app().await;
    let resp = app
        .oneshot(Request::get("/v2/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("Docker-Distribution-API-Version").unwrap(),
        "registry/2.0"
    );
}

/// S1: push a blob via a chunked session, then confirm it with HEAD.
#[tokio::test]
async fn s1_push_and_pull_blob() {
    let app = test_app().await;
    let content = vec![0u8; 4096];
    let digest = sha256_hex(&content);

    let resp = app
        .clone()
        .oneshot(
            Request::post("/v2/alpine/blobs/uploads/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let location = resp.headers().get("Location").unwrap().to_str().unwrap().to_string();
    assert!(location.ends_with("/0"));
    let session_id = location
        .trim_end_matches("/0")
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();

    let resp = app
        .clone()
        .oneshot(
            Request::patch(format!("/v2/uploads/{session_id}/0"))
                .body(Body::from(content.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = app
        .clone()
        .oneshot(
            Request::put(format!("/v2/uploads/{session_id}/1?digest={digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .oneshot(
            Request::head(format!("/v2/alpine/blobs/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

/// S2: push a manifest referencing a blob pushed in S1 and pull it back.
#[tokio::test]
async fn s2_manifest_roundtrip() {
    let app = test_app().await;
    let content = vec![0u8; 4096];
    let digest = sha256_hex(&content);

    app.clone()
        .oneshot(
            Request::post("/v2/alpine/blobs/uploads/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let resp = app
        .clone()
        .oneshot(
            Request::post("/v2/alpine/blobs/uploads/?digest=".to_string() + &digest)
                .body(Body::from(content.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let manifest_body = json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "digest": digest, "size": 4096},
        "layers": []
    });
    let body = serde_json::to_vec(&manifest_body).unwrap();

    let resp = app
        .clone()
        .oneshot(
            Request::put("/v2/alpine/manifests/latest")
                .header("content-type", "application/vnd.docker.distribution.manifest.v2+json")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let manifest_digest = resp
        .headers()
        .get("Docker-Content-Digest")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let resp = app
        .oneshot(
            Request::get("/v2/alpine/manifests/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("Docker-Content-Digest").unwrap(),
        manifest_digest.as_str()
    );
}

/// S3: a digest that doesn't match the uploaded bytes is rejected, and the
/// bogus digest never shows up as a blob.
#[tokio::test]
async fn s3_digest_mismatch_rejected() {
    let app = test_app().await;

    let resp = app
        .clone()
        .oneshot(
            Request::post("/v2/alpine/blobs/uploads/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let location = resp.headers().get("Location").unwrap().to_str().unwrap().to_string();
    let session_id = location
        .trim_end_matches("/0")
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();

    app.clone()
        .oneshot(
            Request::patch(format!("/v2/uploads/{session_id}/0"))
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();

    let bogus = "sha256:".to_string() + &"0".repeat(64);
    let resp = app
        .clone()
        .oneshot(
            Request::put(format!("/v2/uploads/{session_id}/1?digest={bogus}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .oneshot(
            Request::head(format!("/v2/alpine/blobs/{bogus}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

/// S5: N concurrent deletes of the same manifest return exactly one 202.
#[tokio::test]
async fn s5_concurrent_delete_has_one_winner() {
    let app = test_app().await;
    let body = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "digest": sha256_hex(b""), "size": 0},
        "layers": []
    }))
    .unwrap();

    let resp = app
        .clone()
        .oneshot(
            Request::post("/v2/alpine/blobs/uploads/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let location = resp.headers().get("Location").unwrap().to_str().unwrap().to_string();
    let session_id = location
        .trim_end_matches("/0")
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();
    app.clone()
        .oneshot(
            Request::put(format!("/v2/uploads/{session_id}/0?digest={}", sha256_hex(b"")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    app.clone()
        .oneshot(
            Request::put("/v2/alpine/manifests/latest")
                .header("content-type", "application/vnd.docker.distribution.manifest.v2+json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let futures = (0..10).map(|_| {
        let app = app.clone();
        async move {
            app.oneshot(
                Request::delete("/v2/alpine/manifests/latest")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
        }
    });
    let results = futures::future::join_all(futures).await;

    let accepted = results.iter().filter(|s| **s == StatusCode::ACCEPTED).count();
    let not_found = results.iter().filter(|s| **s == StatusCode::NOT_FOUND).count();
    assert_eq!(accepted, 1);
    assert_eq!(not_found, 9);
}

/// S6: catalog and tag listing after pushing two tags in one repository.
#[tokio::test]
async fn s6_catalog_and_tags() {
    let app = test_app().await;
    for tag in ["latest", "3.18"] {
        let config_bytes = tag.as_bytes();
        let config_digest = sha256_hex(config_bytes);
        app.clone()
            .oneshot(
                Request::post("/v2/alpine/blobs/uploads/?digest=".to_string() + &config_digest)
                    .body(Body::from(config_bytes.to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = serde_json::to_vec(&json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "digest": config_digest, "size": config_bytes.len()},
            "layers": []
        }))
        .unwrap();
        let resp = app
            .clone()
            .oneshot(
                Request::put(format!("/v2/alpine/manifests/{tag}"))
                    .header("content-type", "application/vnd.docker.distribution.manifest.v2+json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let resp = app
        .clone()
        .oneshot(Request::get("/v2/_catalog").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    let catalog: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(catalog["repositories"], json!(["alpine"]));

    let resp = app
        .oneshot(
            Request::get("/v2/alpine/tags/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    let tags: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let mut tag_list: Vec<String> = tags["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    tag_list.sort();
    assert_eq!(tag_list, vec!["3.18".to_string(), "latest".to_string()]);
}

/// S4: after deleting the only manifest referencing a blob, GC reclaims it.
#[tokio::test]
async fn s4_delete_then_gc_reclaims_blob() {
    let app = test_app().await;
    let content = vec![1u8; 4096];
    let digest = sha256_hex(&content);

    app.clone()
        .oneshot(
            Request::post("/v2/alpine/blobs/uploads/?digest=".to_string() + &digest)
                .body(Body::from(content.clone()))
                .unwrap(),
        )
        .await
        .unwrap();

    let body = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "digest": digest, "size": 4096},
        "layers": []
    }))
    .unwrap();
    app.clone()
        .oneshot(
            Request::put("/v2/alpine/manifests/latest")
                .header("content-type", "application/vnd.docker.distribution.manifest.v2+json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let resp = app
        .clone()
        .oneshot(
            Request::delete("/v2/alpine/manifests/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = app
        .clone()
        .oneshot(
            Request::get("/api/garbage-collect/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let stats_body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    let stats: serde_json::Value = serde_json::from_slice(&stats_body).unwrap();
    assert!(stats["blobsRemoved"].as_i64().unwrap() >= 1);

    let resp = app
        .clone()
        .oneshot(
            Request::post("/api/garbage-collect")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let gc_body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    let gc_result: serde_json::Value = serde_json::from_slice(&gc_body).unwrap();
    assert!(gc_result["blobsRemoved"].as_i64().unwrap() >= 1);
    assert!(gc_result["spaceFreed"].as_i64().unwrap() >= 4096);

    let resp = app
        .oneshot(
            Request::head(format!("/v2/alpine/blobs/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

/// Invariant 1 (dedup): N concurrent finalizes of the same digest all
/// succeed and leave exactly one blob row behind.
#[tokio::test]
async fn dedup_concurrent_finalize_yields_one_blob() {
    let (_app, store) = test_app_and_store().await;
    let content = vec![7u8; 256];
    let digest = sha256_hex(&content);

    let futures = (0..8).map(|_| {
        let store = store.clone();
        let content = content.clone();
        let digest = digest.clone();
        async move {
            let session_id = store.create_session(Some(digest.as_str())).await.unwrap();
            store.add_blob_chunk(&session_id, 0, &content).await.unwrap();
            let result = store.finalize_blob(&session_id, &digest).await;
            store.discard_session(&session_id).await.unwrap();
            result
        }
    });
    let results = futures::future::join_all(futures).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let digests = store.list_blob_digests().await.unwrap();
    assert_eq!(digests.iter().filter(|d| *d == &digest).count(), 1);
}

/// Invariant 5 (idempotence): pushing the identical manifest body twice at
/// the same (repo, tag) leaves the same state and doesn't duplicate refs.
#[tokio::test]
async fn add_manifest_is_idempotent() {
    let (_app, store) = test_app_and_store().await;
    let content = b"config-bytes".to_vec();
    let digest = sha256_hex(&content);
    let session_id = store.create_session(Some(digest.as_str())).await.unwrap();
    store.add_blob_chunk(&session_id, 0, &content).await.unwrap();
    store.finalize_blob(&session_id, &digest).await.unwrap();
    store.discard_session(&session_id).await.unwrap();

    let body = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "digest": digest, "size": content.len()},
        "layers": []
    }))
    .unwrap();

    let d1 = store
        .add_manifest("alpine", "latest", "application/vnd.docker.distribution.manifest.v2+json", body.clone(), true)
        .await
        .unwrap();
    let d2 = store
        .add_manifest("alpine", "latest", "application/vnd.docker.distribution.manifest.v2+json", body, true)
        .await
        .unwrap();
    assert_eq!(d1, d2);

    let row = store.get_manifest("alpine", "latest").await.unwrap();
    assert_eq!(row.digest, d1);

    let stats = store
        .garbage_collect_stats(std::time::Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(stats.blobs_removed, 0);
}

/// Invariant 6 (session density): a duplicate chunk number is rejected
/// without disturbing the session's existing chunk count.
#[tokio::test]
async fn duplicate_chunk_number_rejected() {
    let (_app, store) = test_app_and_store().await;
    let session_id = store.create_session(None).await.unwrap();
    store.add_blob_chunk(&session_id, 0, b"abc").await.unwrap();

    let err = store.add_blob_chunk(&session_id, 0, b"xyz").await;
    assert!(err.is_err());

    assert_eq!(store.next_chunk_number(&session_id).await.unwrap(), 1);
}

/// Invariant 7 (reclamation): deleting a repository then running GC frees
/// every blob that repository's manifests alone referenced.
#[tokio::test]
async fn reclamation_after_repository_delete_and_gc() {
    let (_app, store) = test_app_and_store().await;
    let content = vec![9u8; 128];
    let digest = sha256_hex(&content);
    let session_id = store.create_session(Some(digest.as_str())).await.unwrap();
    store.add_blob_chunk(&session_id, 0, &content).await.unwrap();
    store.finalize_blob(&session_id, &digest).await.unwrap();
    store.discard_session(&session_id).await.unwrap();

    let body = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "config": {"mediaType": "application/vnd.docker.container.image.v1+json", "digest": digest, "size": content.len()},
        "layers": []
    }))
    .unwrap();
    store
        .add_manifest("scratch", "latest", "application/vnd.docker.distribution.manifest.v2+json", body, true)
        .await
        .unwrap();

    // one tag-keyed row plus its digest-keyed sibling (see DESIGN.md's
    // denormalized manifest model).
    let deleted = store.delete_repository("scratch").await.unwrap();
    assert_eq!(deleted, 2);

    let result = store
        .garbage_collect(std::time::Duration::from_secs(3600))
        .await
        .unwrap();
    assert!(result.blobs_removed >= 1);
    assert!(result.space_freed >= 128);

    assert!(!store.has_blob(&digest).await.unwrap());
}

/// §4.8: once the shared health flag is down (the background integrity
/// monitor's doing in the real server), every request fails fast with
/// 503 rather than touching the store.
#[tokio::test]
async fn unhealthy_flag_short_circuits_to_503() {
    let db = Db::connect_in_memory().await.unwrap();
    let store = Store::new(db);
    let config = Arc::new(test_config());
    let app = http::router(AppState {
        store,
        config,
        healthy: Arc::new(AtomicBool::new(false)),
    });

    let resp = app
        .oneshot(Request::get("/v2/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

/// "portable by copying the directory" (spec.md §6): a blob written
/// through a disk-backed `Db::connect` survives closing the pool and
/// reopening the same directory from scratch.
#[tokio::test]
async fn database_directory_is_portable_across_reconnects() {
    let dir = tempfile::tempdir().unwrap();
    let database_path = dir.path().to_string_lossy().to_string();
    let content = b"durable-bytes".to_vec();
    let digest = sha256_hex(&content);

    {
        let db = Db::connect(&disk_config(database_path.clone())).await.unwrap();
        let store = Store::new(db);
        let session_id = store.create_session(Some(digest.as_str())).await.unwrap();
        store.add_blob_chunk(&session_id, 0, &content).await.unwrap();
        store.finalize_blob(&session_id, &digest).await.unwrap();
        store.discard_session(&session_id).await.unwrap();
        assert!(store.has_blob(&digest).await.unwrap());
    }

    let db = Db::connect(&disk_config(database_path)).await.unwrap();
    let store = Store::new(db);
    assert!(store.has_blob(&digest).await.unwrap());
    let blob = store.get_blob(&digest).await.unwrap();
    assert_eq!(blob.content, content);
}
