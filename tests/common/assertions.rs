//! Event collection and document inspection helpers

use folio_dl::Event;
use std::io::{Cursor, Read};
use std::time::Duration;
use tokio::sync::broadcast;

/// Collect events until `stop` matches one (inclusive) or `timeout` elapses
pub async fn collect_events_until<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    stop: F,
) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        let done = stop(&event);
        collected.push(event);
        if done {
            break;
        }
    }
    collected
}

/// Events up to and including the slot release
pub async fn collect_until_released(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    collect_events_until(events, Duration::from_secs(10), |e| {
        matches!(e, Event::Released { .. })
    })
    .await
}

/// Percentages of all progress events, in order
pub fn progress_percents(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

/// Contents of entry `name` of the zip archive `bytes`
pub fn zip_entry(bytes: &[u8], name: &str) -> Option<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;
    let mut file = archive.by_name(name).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    Some(contents)
}

/// `[width, height]` of every page's MediaBox, in page order
pub fn pdf_page_sizes(bytes: &[u8]) -> Vec<[f32; 2]> {
    let doc = lopdf::Document::load_mem(bytes).unwrap_or_else(|e| panic!("invalid PDF: {e}"));
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let page = doc
                .get_object(page_id)
                .and_then(|o| o.as_dict())
                .unwrap_or_else(|e| panic!("page object: {e}"));
            let media_box = page
                .get(b"MediaBox")
                .and_then(|o| o.as_array())
                .unwrap_or_else(|e| panic!("MediaBox: {e}"));
            let number = |o: &lopdf::Object| match o {
                lopdf::Object::Integer(i) => *i as f32,
                lopdf::Object::Real(r) => *r,
                other => panic!("MediaBox entry {other:?}"),
            };
            [
                number(&media_box[2]) - number(&media_box[0]),
                number(&media_box[3]) - number(&media_box[1]),
            ]
        })
        .collect()
}

/// Number of image XObjects (soft masks included) in the PDF `bytes`
pub fn pdf_image_count(bytes: &[u8]) -> usize {
    let doc = lopdf::Document::load_mem(bytes).unwrap_or_else(|e| panic!("invalid PDF: {e}"));
    doc.objects
        .values()
        .filter(|object| match object {
            lopdf::Object::Stream(stream) => stream
                .dict
                .get(b"Subtype")
                .and_then(|o| o.as_name())
                .is_ok_and(|name| name == b"Image"),
            _ => false,
        })
        .count()
}
