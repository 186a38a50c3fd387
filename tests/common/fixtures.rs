//! Reader responses and a wiremock-backed reader

use folio_dl::Config;
use folio_dl::cipher::{CipherKey, encrypt};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Decryption key of [`CREDENTIAL`]
pub const KEY: &str = "731";

/// Session credential handed to image downloads
pub const CREDENTIAL: &str = "731:4f2a9c";

/// Bearer token the reader expects
pub const TOKEN: &str = "reader-token";

/// An SVG page with the given view box and a single filled rectangle
pub fn svg_page(width: u32, height: u32) -> String {
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}"><rect x="5" y="5" width="20" height="30" fill="#336699"/></svg>"##
    )
}

/// A 1x1 lossless WebP
pub const TINY_WEBP: [u8; 34] = [
    0x52, 0x49, 0x46, 0x46, 0x1a, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50, 0x56, 0x50, 0x38, 0x4c,
    0x0d, 0x00, 0x00, 0x00, 0x2f, 0x00, 0x00, 0x00, 0x10, 0x07, 0x10, 0x11, 0x11, 0x88, 0x88, 0xfe,
    0x07, 0x00,
];

/// An SVG page drawing the remote image at `href`
pub fn svg_page_with_image(width: u32, height: u32, href: &str) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" viewBox="0 0 {width} {height}"><image x="0" y="0" width="40" height="40" xlink:href="{href}"/></svg>"#
    )
}

/// Image page response: `svg` encrypted with [`KEY`] inside `<bookpage>`
pub fn image_page_response(svg: &str) -> String {
    let key = CipherKey::parse(KEY).unwrap_or_else(|e| panic!("fixture key: {e}"));
    format!(
        "<?xml version=\"1.0\"?><response><bookpage><![CDATA[{}]]></bookpage></response>",
        encrypt(svg, &key)
    )
}

/// Text page response carrying `text` inside `<page_text>`
pub fn text_page_response(text: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><response><page_text><![CDATA[{text}]]></page_text></response>"
    )
}

/// Catalog page naming `author` and listing `(title, page)` headings
pub fn catalog_html(author: &str, headings: &[(&str, u32)]) -> String {
    let items: String = headings
        .iter()
        .map(|(title, page)| {
            format!(
                r#"<div class="book-single__header-item"><a class="title">{title}</a><span class="page-number">{page}</span></div>"#
            )
        })
        .collect();
    format!(
        r#"<!DOCTYPE html><html><body>
<div class="book-link qa_booklist_autors"><a href="/author/1">{author}</a></div>
<div class="book-single__headers-wrap">{items}</div>
</body></html>"#
    )
}

/// Config pointing at `server` with fast retries
pub fn reader_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.fetch.base_url = server.uri();
    config.fetch.auth_token = Some(TOKEN.to_string());
    config.retry.max_attempts = 3;
    config.retry.delay = Duration::from_millis(1);
    config
}

/// Serve `body` for every request of page `page` of document `doc`
pub async fn mount_page(server: &MockServer, doc: &str, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/read/page"))
        .and(query_param("doc", doc))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Answer every request of page `page` of document `doc` with `status`
pub async fn mount_page_status(server: &MockServer, doc: &str, page: u32, status: u16) {
    Mock::given(method("GET"))
        .and(path("/read/page"))
        .and(query_param("doc", doc))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Serve `bytes` as the image at `image_path`
pub async fn mount_image(server: &MockServer, image_path: &str, bytes: &[u8]) {
    Mock::given(method("GET"))
        .and(path(image_path))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/webp")
                .set_body_bytes(bytes.to_vec()),
        )
        .mount(server)
        .await;
}

/// Serve `html` as the catalog page of document `doc`
pub async fn mount_catalog(server: &MockServer, doc: &str, html: String) {
    Mock::given(method("GET"))
        .and(path("/catalog/document"))
        .and(query_param("id", doc))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}
