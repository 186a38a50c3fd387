use super::test_helpers::*;
use super::*;
use crate::error::{AdmissionError, FetchError};
use crate::types::{
    DocumentMetadata, DownloadRequest, Event, OutputFormat, OwnerId, ReleaseReason, SessionState,
    TocNode,
};
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;


/// Receive events until the slot is released, giving up after ten seconds
async fn events_until_released(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, rx.recv()).await {
        let released = matches!(event, Event::Released { .. });
        events.push(event);
        if released {
            break;
        }
    }
    events
}

fn progress_values(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

fn zip_entry(bytes: &[u8], name: &str) -> Option<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).unwrap();
    Some(contents)
}

/// Entry names in archive order (`file_names()` iterates a map and loses it)
fn zip_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn image_request(end: u32) -> DownloadRequest {
    DownloadRequest::new("2001", 1, end, OutputFormat::ImageContainer)
        .with_title("Vector Book")
        .with_credential(TEST_CREDENTIAL)
}

fn text_request(end: u32) -> DownloadRequest {
    DownloadRequest::new("3001", 1, end, OutputFormat::TextContainer).with_title("Text Book")
}
