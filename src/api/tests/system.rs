use super::*;
use crate::types::{DownloadRequest, OutputFormat};
use tokio_stream::StreamExt;

#[tokio::test]
async fn health_reports_version_and_admission() {
    let downloader = create_test_downloader(FakeReader::default()).await;

    let (status, json) = send(app(&downloader), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["accepting"], true);

    downloader.shutdown().await.unwrap();
    let (_, json) = send(app(&downloader), get("/health")).await;
    assert_eq!(json["accepting"], false);
}

#[tokio::test]
async fn shutdown_turns_new_downloads_into_503() {
    let downloader = create_test_downloader(FakeReader::default()).await;
    downloader.shutdown().await.unwrap();

    let body = json!({
        "source_id": "3001",
        "range_start": 1,
        "range_end": 1,
        "format": "text_container",
    });
    let (status, json) = send(app(&downloader), post_json("/downloads", body)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["code"], "shutting_down");
}

#[tokio::test]
async fn openapi_json_is_served() {
    let downloader = create_test_downloader(FakeReader::default()).await;

    let (status, json) = send(app(&downloader), get("/openapi.json")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["info"]["title"], "folio-dl REST API");
    assert!(json["paths"]["/downloads/current"].is_object());
}

#[tokio::test]
async fn event_stream_forwards_events_by_kind() {
    let downloader = create_test_downloader(hanging_reader()).await;

    let response = app(&downloader).oneshot(get("/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    // The stream subscribed when the handler ran, so this reservation is delivered
    let request = DownloadRequest::new("3001", 1, 2, OutputFormat::TextContainer);
    let reservation = downloader.reserve(request, None).await.unwrap();

    let mut body = response.into_body().into_data_stream();
    let mut received = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !received.contains("event: reserved") {
        let chunk = tokio::time::timeout_at(deadline, body.next())
            .await
            .expect("no SSE frame before the deadline")
            .unwrap()
            .unwrap();
        received.push_str(&String::from_utf8_lossy(&chunk));
    }

    assert!(received.contains("\"type\":\"reserved\""));
    assert!(received.contains(&format!("\"id\":{}", reservation.id)));
}
