//! Validation of page response bodies
//!
//! The reader wraps each page in a small XML document. Text pages carry the page text in a
//! `<page_text>` element, image pages carry the encrypted SVG in a `<bookpage>` element. A body
//! without a non-empty payload element is treated like a failed request.

use crate::error::FetchError;
use crate::types::OutputFormat;

/// Extract the trimmed payload of a page response
///
/// The payload is the concatenated text of every text and CDATA node below the first element
/// named after [`OutputFormat::payload_element`].
pub fn extract_payload(body: &str, format: OutputFormat) -> Result<String, FetchError> {
    let element = format.payload_element();

    let mut options = roxmltree::ParsingOptions::default();
    options.allow_dtd = true;
    let doc = roxmltree::Document::parse_with_options(body, options)
        .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;

    let node = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == element)
        .ok_or(FetchError::MissingElement { element })?;

    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FetchError::MissingElement { element });
    }

    Ok(trimmed.to_string())
}
