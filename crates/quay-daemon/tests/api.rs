//! HTTP API tests against in-memory collaborators

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use quay_daemon::config::ServerConfig;
use quay_daemon::{create_router, AppState};
use quay_deployment::{
    BroadcastPublisher, DeploymentEngine, EngineComponents, EngineConfig, NoopInstaller,
    ReleaseRegistry,
};
use quay_store::{DataLayout, InMemoryBundleStore, InMemoryMetadataStore};
use quay_supervisor::{InMemorySupervisor, LogStream};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "quay-test-boundary";

struct TestApp {
    _dir: tempfile::TempDir,
    router: Router,
    supervisor: Arc<InMemorySupervisor>,
}

fn test_app_with_token(token: Option<&str>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = Arc::new(InMemorySupervisor::new());
    let events = Arc::new(BroadcastPublisher::default());
    let components = EngineComponents {
        layout: DataLayout::new(dir.path()),
        bundles: Arc::new(InMemoryBundleStore::new()),
        metadata: Arc::new(InMemoryMetadataStore::new()),
        supervisor: supervisor.clone(),
        installer: Arc::new(NoopInstaller),
        events: events.clone(),
    };
    let engine = Arc::new(DeploymentEngine::new(
        ReleaseRegistry::new(),
        components,
        EngineConfig::default(),
    ));
    let state = AppState::new(engine, events, token);
    let router = create_router(state, &ServerConfig::default());
    TestApp {
        _dir: dir,
        router,
        supervisor,
    }
}

fn test_app() -> TestApp {
    test_app_with_token(None)
}

fn pack(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn app_bundle() -> Vec<u8> {
    pack(&[
        ("package.json", br#"{"name":"app","version":"1.0.0","main":"server.js"}"#),
        ("server.js", b"console.log('up')"),
    ])
}

fn multipart_body(field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

async fn post_empty(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

async fn upload(app: &Router, service: &str, bytes: &[u8]) -> (StatusCode, Value) {
    upload_as(app, service, "package", "app.tgz", "application/gzip", bytes).await
}

async fn upload_as(
    app: &Router,
    service: &str,
    field: &str,
    filename: &str,
    content_type: &str,
    bytes: &[u8],
) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(format!("/api/v1/services/{}/releases", service))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(field, filename, content_type, bytes)))
            .unwrap(),
    )
    .await
}

async fn create(app: &Router, name: &str) {
    let (status, _) = post_json(app, "/api/v1/services", json!({ "name": name })).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app();
    let (status, json) = get(&app.router, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["services"], 0);
}

#[tokio::test]
async fn test_token_required_when_configured() {
    let app = test_app_with_token(Some("s3cret"));

    let (status, json) = get(&app.router, "/api/v1/services").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");

    let (status, _) = send(
        &app.router,
        Request::builder()
            .uri("/api/v1/services")
            .header(header::AUTHORIZATION, "Bearer wrong")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app.router,
        Request::builder()
            .uri("/api/v1/services")
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = get(&app.router, "/api/v1/services?token=s3cret").await;
    assert_eq!(status, StatusCode::OK);

    // Health stays public
    let (status, _) = get(&app.router, "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_and_list_services() {
    let app = test_app();

    let (status, json) = post_json(
        &app.router,
        "/api/v1/services",
        json!({ "name": "web", "env": { "PORT": "3000" } }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["name"], "web");
    assert_eq!(json["env"]["PORT"], "3000");
    assert_eq!(json["status"], "stopped");
    assert_eq!(json["releases"], json!([]));
    assert_eq!(json["activeReleaseId"], Value::Null);

    create(&app.router, "api").await;

    let (status, json) = get(&app.router, "/api/v1/services").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["api", "web"]);
}

#[tokio::test]
async fn test_create_duplicate_and_invalid_names() {
    let app = test_app();
    create(&app.router, "web").await;

    let (status, json) = post_json(&app.router, "/api/v1/services", json!({ "name": "web" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");

    let (status, _) = post_json(
        &app.router,
        "/api/v1/services",
        json!({ "name": "../etc" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_service_is_not_found() {
    let app = test_app();

    let (status, json) = get(&app.router, "/api/v1/services/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");

    let (status, _) = get(&app.router, "/api/v1/services/ghost/releases").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_empty(&app.router, "/api/v1/services/ghost/start").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app.router, "/api/v1/services/ghost/logs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = upload(&app.router, "ghost", &app_bundle()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_release_becomes_active() {
    let app = test_app();
    create(&app.router, "web").await;

    let (status, release) = upload(&app.router, "web", &app_bundle()).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = release["id"].as_str().unwrap().to_string();
    assert_eq!(release["filename"], format!("{}.tgz", id));
    assert_eq!(release["metadata"]["name"], "app");
    assert_eq!(release["metadata"]["main"], "server.js");

    let (_, service) = get(&app.router, "/api/v1/services/web").await;
    assert_eq!(service["activeReleaseId"], id.as_str());
    assert_eq!(service["activeRelease"]["id"], id.as_str());

    let (status, releases) = get(&app.router, "/api/v1/services/web/releases").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(releases.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_upload_rejections() {
    let app = test_app();
    create(&app.router, "web").await;

    let (status, json) = upload(&app.router, "web", b"definitely not gzip").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], "INVALID_BUNDLE");

    let (status, _) = upload_as(
        &app.router,
        "web",
        "package",
        "app.zip",
        "application/zip",
        &app_bundle(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = upload_as(
        &app.router,
        "web",
        "bundle",
        "app.tgz",
        "application/gzip",
        &app_bundle(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, releases) = get(&app.router, "/api/v1/services/web/releases").await;
    assert_eq!(releases, json!([]));
}

#[tokio::test]
async fn test_activate_and_delete_release() {
    let app = test_app();
    create(&app.router, "web").await;

    let (_, r1) = upload(&app.router, "web", &app_bundle()).await;
    let (_, r2) = upload(&app.router, "web", &app_bundle()).await;
    let r1 = r1["id"].as_str().unwrap().to_string();
    let r2 = r2["id"].as_str().unwrap().to_string();

    let (status, json) = post_empty(
        &app.router,
        &format!("/api/v1/services/web/releases/{}/activate", r1),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["activeReleaseId"], r1.as_str());

    // Deleting the active release hands the pointer to the last remaining one
    let (status, json) = send(
        &app.router,
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/services/web/releases/{}", r1))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deletedReleaseId"], r1.as_str());
    assert_eq!(json["activeReleaseId"], r2.as_str());

    let (status, _) = post_empty(
        &app.router,
        &format!("/api/v1/services/web/releases/{}/activate", r1),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_empty(
        &app.router,
        "/api/v1/services/web/releases/not-a-uuid/activate",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_env() {
    let app = test_app();
    create(&app.router, "web").await;

    let (status, json) = send(
        &app.router,
        Request::builder()
            .method("PUT")
            .uri("/api/v1/services/web/env")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "env": { "A": "1" } }).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "env": { "A": "1" } }));

    let (_, service) = get(&app.router, "/api/v1/services/web").await;
    assert_eq!(service["env"], json!({ "A": "1" }));
}

#[tokio::test]
async fn test_start_without_release_conflicts() {
    let app = test_app();
    create(&app.router, "web").await;

    let (status, json) = post_empty(&app.router, "/api/v1/services/web/start").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
    assert!(app.supervisor.started_specs().is_empty());
}

#[tokio::test]
async fn test_start_stop_lifecycle() {
    let app = test_app();
    create(&app.router, "web").await;
    upload(&app.router, "web", &app_bundle()).await;

    let (status, json) = post_empty(&app.router, "/api/v1/services/web/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "running");

    let specs = app.supervisor.started_specs();
    assert_eq!(specs.len(), 1);
    assert!(specs[0].entry_point.ends_with("server.js"));

    let (_, service) = get(&app.router, "/api/v1/services/web").await;
    assert_eq!(service["status"], "running");

    let (status, json) = get(&app.router, "/api/v1/services/web/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "running");

    let (status, json) = post_empty(&app.router, "/api/v1/services/web/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "stopped");

    let (_, json) = get(&app.router, "/api/v1/services/web/status").await;
    assert_eq!(json["status"], "stopped");
}

#[tokio::test]
async fn test_supervisor_failure_is_bad_gateway() {
    let app = test_app();
    create(&app.router, "web").await;
    upload(&app.router, "web", &app_bundle()).await;
    app.supervisor.set_fail_starts(true);

    let (status, json) = post_empty(&app.router, "/api/v1/services/web/start").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "SUPERVISOR_ERROR");

    let (_, service) = get(&app.router, "/api/v1/services/web").await;
    assert_eq!(service["status"], "stopped");
}

#[tokio::test]
async fn test_logs_tail_and_clear() {
    let app = test_app();
    create(&app.router, "web").await;

    app.supervisor.emit_log("web", LogStream::Out, "one");
    app.supervisor.emit_log("web", LogStream::Err, "two");
    app.supervisor.emit_log("web", LogStream::Out, "three");

    let (status, json) = get(&app.router, "/api/v1/services/web/logs?tail=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "lines": ["[err] two", "[out] three"] }));

    let (status, json) = post_empty(&app.router, "/api/v1/services/web/logs/clear").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "success": true }));

    let (_, json) = get(&app.router, "/api/v1/services/web/logs").await;
    assert_eq!(json, json!({ "lines": [] }));
}

#[tokio::test]
async fn test_event_stream_opens() {
    let app = test_app();
    let resp = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/events/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}
