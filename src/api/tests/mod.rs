use super::*;
use crate::downloader::test_helpers::{self, FakeReader, Reply};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

mod system;

/// Test downloader over `reader` wrapped in Arc
async fn create_test_downloader(reader: FakeReader) -> Arc<Downloader> {
    Arc::new(test_helpers::create_test_downloader(Arc::new(reader)).await)
}

/// Router using the downloader's own config
fn app(downloader: &Arc<Downloader>) -> Router {
    create_router(downloader.clone(), downloader.config.clone())
}

/// Send `request` and return the status with the body parsed as JSON
///
/// Empty bodies become `Null` and non-JSON bodies (axum rejections) a JSON string.
async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Poll `GET /downloads/current` until its status is `status`
async fn wait_for_status(downloader: &Arc<Downloader>, status: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let (_, json) = send(app(downloader), get("/downloads/current")).await;
        if json["status"] == status {
            return json;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session never reached {status}, last state {json}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn api_server_spawns_on_free_port() {
    let downloader = create_test_downloader(FakeReader::default()).await;

    let mut config = (*downloader.config).clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let downloader = downloader.clone();
        async move { start_api_server(downloader, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server should still be serving");
    api_handle.abort();
}

#[tokio::test]
async fn spawn_api_server_method() {
    let mut config = test_helpers::test_config();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let downloader = Downloader::with_sources(
        config,
        test_helpers::sources(Arc::new(FakeReader::default())),
    )
    .await
    .unwrap();

    let api_handle = downloader.spawn_api_server();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished());
    api_handle.abort();
}

#[tokio::test]
async fn cors_headers_when_enabled() {
    let downloader = create_test_downloader(FakeReader::default()).await;

    let mut config = (*downloader.config).clone();
    config.api.cors_enabled = true;
    config.api.cors_origins = vec!["*".to_string()];
    let app = create_router(downloader, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn no_cors_headers_when_disabled() {
    let downloader = create_test_downloader(FakeReader::default()).await;

    let mut config = (*downloader.config).clone();
    config.api.cors_enabled = false;
    let app = create_router(downloader, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn configured_api_key_guards_every_route() {
    let downloader = create_test_downloader(FakeReader::default()).await;

    let mut config = (*downloader.config).clone();
    config.api.api_key = Some("hunter2".to_string());
    let config = Arc::new(config);

    let (status, json) = send(
        create_router(downloader.clone(), config.clone()),
        get("/downloads/current"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "unauthorized");

    let request = Request::builder()
        .uri("/downloads/current")
        .header("X-Api-Key", "hunter2")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(create_router(downloader, config), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "idle");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let downloader = create_test_downloader(FakeReader::default()).await;
    let (status, _) = send(app(&downloader), get("/queue")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Reader whose first page never answers, so a started download stays active
fn hanging_reader() -> FakeReader {
    FakeReader::default().always(1, Reply::Hang)
}
