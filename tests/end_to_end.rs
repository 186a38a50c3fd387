//! Full downloads against a mocked reader over HTTP
//!
//! Every test starts a wiremock server standing in for the reader's page and catalog
//! endpoints and drives the public [`Downloader`] API.

mod common;

use common::*;
use folio_dl::{
    Config, DownloadRequest, Downloader, Error, Event, FetchError, FileCollisionAction,
    OutputFormat, ReleaseReason, SessionState,
};
use wiremock::MockServer;

async fn downloader_for(config: Config) -> Downloader {
    Downloader::new(config)
        .await
        .unwrap_or_else(|e| panic!("downloader: {e}"))
}

fn text_request(doc: &str, end: u32) -> DownloadRequest {
    DownloadRequest::new(doc, 1, end, OutputFormat::TextContainer).with_title("Field Notes")
}

#[tokio::test]
async fn image_pages_become_a_pdf() {
    let server = MockServer::start().await;
    for (page, width) in [(1, 200), (2, 210), (3, 220)] {
        mount_page(&server, "2001", page, image_page_response(&svg_page(width, 300))).await;
    }
    let downloader = downloader_for(reader_config(&server)).await;
    let mut events = downloader.subscribe();

    let request = DownloadRequest::new("2001", 1, 3, OutputFormat::ImageContainer)
        .with_title("Atlas")
        .with_credential(CREDENTIAL);
    let output = downloader.download(request, None).await.unwrap();

    assert_eq!(output.filename, "Atlas.pdf");
    assert!(output.bytes.starts_with(b"%PDF-"));
    assert_eq!(
        pdf_page_sizes(&output.bytes),
        vec![[200.0, 300.0], [210.0, 300.0], [220.0, 300.0]]
    );

    let events = collect_until_released(&mut events).await;
    assert!(matches!(events.first(), Some(Event::Reserved { .. })));
    assert_eq!(progress_percents(&events), vec![34, 67, 99]);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::Complete { filename, .. } if filename == "Atlas.pdf"
    )));
    assert!(matches!(
        events.last(),
        Some(Event::Released {
            reason: ReleaseReason::Completed,
            ..
        })
    ));
    assert_eq!(downloader.state().await, SessionState::Idle);
}

#[tokio::test]
async fn remote_webp_images_are_embedded_in_the_pdf() {
    let server = MockServer::start().await;
    let figure = format!("{}/assets/figure.webp", server.uri());
    let gone = format!("{}/assets/gone.webp", server.uri());
    mount_image(&server, "/assets/figure.webp", &TINY_WEBP).await;
    for (page, href) in [(1, &figure), (2, &gone)] {
        mount_page(
            &server,
            "2002",
            page,
            image_page_response(&svg_page_with_image(200, 300, href)),
        )
        .await;
    }
    let downloader = downloader_for(reader_config(&server)).await;

    let request = DownloadRequest::new("2002", 1, 2, OutputFormat::ImageContainer)
        .with_credential(CREDENTIAL);
    let output = downloader.download(request, None).await.unwrap();

    assert_eq!(pdf_page_sizes(&output.bytes).len(), 2);
    assert!(pdf_image_count(&output.bytes) >= 1);

    let image_requests: Vec<String> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path().starts_with("/assets/"))
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(image_requests, vec!["/assets/figure.webp", "/assets/gone.webp"]);
}

#[tokio::test]
async fn text_pages_and_catalog_become_an_epub() {
    let server = MockServer::start().await;
    for page in 1..=3 {
        mount_page(
            &server,
            "9001",
            page,
            text_page_response(&format!("Paragraph on page {page}")),
        )
        .await;
    }
    mount_catalog(
        &server,
        "9001",
        catalog_html(
            "A. Writer",
            &[("Chapter One", 1), ("Chapter Two", 3), ("Index", 50)],
        ),
    )
    .await;
    let downloader = downloader_for(reader_config(&server)).await;

    let output = downloader
        .download(text_request("9001", 3), None)
        .await
        .unwrap();

    assert_eq!(output.filename, "Field Notes.epub");
    assert_eq!(output.format, OutputFormat::TextContainer);

    let opf = zip_entry(&output.bytes, "EPUB/content.opf").unwrap();
    assert!(opf.contains("<dc:title>Field Notes</dc:title>"));
    assert!(opf.contains("<dc:creator>A. Writer</dc:creator>"));
    assert_eq!(opf.matches("<itemref").count(), 3);

    let nav = zip_entry(&output.bytes, "EPUB/nav.xhtml").unwrap();
    assert!(nav.contains(r#"<a href="page0.xhtml">Chapter One</a>"#));
    assert!(nav.contains(r#"<a href="page2.xhtml">Chapter Two</a>"#));
    assert!(!nav.contains("Index"));

    let page1 = zip_entry(&output.bytes, "EPUB/page1.xhtml").unwrap();
    assert!(page1.contains("<p>Paragraph on page 2</p>"));
}

#[tokio::test]
async fn missing_catalog_still_produces_an_epub() {
    let server = MockServer::start().await;
    mount_page(&server, "9002", 1, text_page_response("Lonely page")).await;
    let downloader = downloader_for(reader_config(&server)).await;

    let output = downloader
        .download(text_request("9002", 1), None)
        .await
        .unwrap();

    let opf = zip_entry(&output.bytes, "EPUB/content.opf").unwrap();
    assert!(opf.contains("<dc:creator>Unknown author</dc:creator>"));
    assert!(zip_entry(&output.bytes, "EPUB/nav.xhtml").is_none());
}

#[tokio::test]
async fn failing_page_exhausts_retries_and_frees_the_slot() {
    let server = MockServer::start().await;
    mount_page(&server, "9003", 1, text_page_response("fine")).await;
    mount_page_status(&server, "9003", 2, 503).await;
    let downloader = downloader_for(reader_config(&server)).await;
    let mut events = downloader.subscribe();

    let err = downloader
        .download(text_request("9003", 2), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Fetch(FetchError::Exhausted {
            page: 2,
            attempts: 3,
            ..
        })
    ));

    let page_two_requests = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.query_pairs().any(|(k, v)| k == "page" && v == "2"))
        .count();
    assert_eq!(page_two_requests, 3);

    let events = collect_until_released(&mut events).await;
    let retries: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            Event::PageRetry { page: 2, attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2]);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, Event::Failed { .. }))
            .count(),
        1
    );
    assert!(!events.iter().any(|e| matches!(e, Event::Complete { .. })));
    assert!(matches!(
        events.last(),
        Some(Event::Released {
            reason: ReleaseReason::Failed,
            ..
        })
    ));

    // The slot is free for the next request
    mount_page(&server, "9004", 1, text_page_response("next")).await;
    assert!(downloader.download(text_request("9004", 1), None).await.is_ok());
}

#[tokio::test]
async fn documents_are_written_to_the_output_dir_without_overwriting() {
    let server = MockServer::start().await;
    mount_page(&server, "9005", 1, text_page_response("Saved page")).await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = reader_config(&server);
    config.output.output_dir = Some(dir.path().to_path_buf());
    config.output.file_collision = FileCollisionAction::Rename;
    let downloader = downloader_for(config).await;

    let first = downloader
        .download(text_request("9005", 1), None)
        .await
        .unwrap();
    let second = downloader
        .download(text_request("9005", 1), None)
        .await
        .unwrap();

    assert_eq!(first.path, Some(dir.path().join("Field Notes.epub")));
    assert_eq!(second.path, Some(dir.path().join("Field Notes (1).epub")));
    let written = std::fs::read(dir.path().join("Field Notes.epub")).unwrap();
    assert_eq!(written, first.bytes);
}

#[tokio::test]
async fn missing_auth_token_fails_without_contacting_the_reader() {
    let server = MockServer::start().await;
    mount_page(&server, "9006", 1, text_page_response("unreachable")).await;

    let mut config = reader_config(&server);
    config.fetch.auth_token = None;
    let downloader = downloader_for(config).await;

    let err = downloader
        .download(text_request("9006", 1), None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Fetch(FetchError::NoAuthToken)));
    let page_requests = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/read/page")
        .count();
    assert_eq!(page_requests, 0);
}
