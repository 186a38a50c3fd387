//! Shared test helpers for creating Downloader instances with scripted collaborators.

use crate::cipher::{CipherKey, encrypt};
use crate::config::Config;
use crate::downloader::Downloader;
use crate::error::FetchError;
use crate::source::{HttpImageSource, MetadataSource, PageSource, Sources, StaticTokenProvider};
use crate::types::{DocumentId, DocumentMetadata, OutputFormat, PageIndex};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Key used by [`image_reader`] pages; matches [`TEST_CREDENTIAL`]
pub(crate) const TEST_KEY: &str = "5381";
/// Credential whose prefix is [`TEST_KEY`]
pub(crate) const TEST_CREDENTIAL: &str = "5381:abcdef";

/// What the fake reader answers for one page attempt
#[derive(Clone, Debug)]
pub(crate) enum Reply {
    Body(String),
    Fail(FetchError),
    /// Never answers
    Hang,
}

/// Page source that replays scripted replies per page and records every request
#[derive(Default)]
pub(crate) struct FakeReader {
    replies: Mutex<HashMap<PageIndex, Vec<Reply>>>,
    fallback: Mutex<HashMap<PageIndex, Reply>>,
    requests: Mutex<Vec<PageIndex>>,
}

impl FakeReader {
    /// Answer every attempt for `page` with `reply`
    pub(crate) fn always(self, page: PageIndex, reply: Reply) -> Self {
        self.fallback.lock().unwrap().insert(page, reply);
        self
    }

    /// Answer the next attempts for `page` with `replies`, in order, before the fallback
    pub(crate) fn script(self, page: PageIndex, replies: Vec<Reply>) -> Self {
        self.replies.lock().unwrap().insert(page, replies);
        self
    }

    /// Pages requested so far, one entry per attempt
    pub(crate) fn requests(&self) -> Vec<PageIndex> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for FakeReader {
    async fn fetch_raw_page(
        &self,
        _source_id: &DocumentId,
        page: PageIndex,
        _token: &str,
        _format: OutputFormat,
    ) -> Result<String, FetchError> {
        self.requests.lock().unwrap().push(page);

        let scripted = {
            let mut replies = self.replies.lock().unwrap();
            replies
                .get_mut(&page)
                .filter(|queue| !queue.is_empty())
                .map(|queue| queue.remove(0))
        };
        let reply = scripted
            .or_else(|| self.fallback.lock().unwrap().get(&page).cloned())
            .unwrap_or(Reply::Fail(FetchError::Http { status: 404 }));

        match reply {
            Reply::Body(body) => Ok(body),
            Reply::Fail(e) => Err(e),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Catalog with a fixed answer
pub(crate) struct FakeCatalog(pub(crate) Result<DocumentMetadata, FetchError>);

#[async_trait]
impl MetadataSource for FakeCatalog {
    async fn document_metadata(
        &self,
        _source_id: &DocumentId,
    ) -> Result<DocumentMetadata, FetchError> {
        self.0.clone()
    }
}

/// A text page response
pub(crate) fn text_body(text: &str) -> String {
    format!("<?xml version=\"1.0\" encoding=\"utf-8\"?><response><page_text><![CDATA[{text}]]></page_text></response>")
}

/// An encrypted SVG page response of the given view-box size
pub(crate) fn image_body(width: u32, height: u32) -> String {
    let svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}"><rect x="1" y="2" width="10" height="12" fill="#204060"/></svg>"##
    );
    let key = CipherKey::parse(TEST_KEY).unwrap();
    format!(
        "<response><bookpage><![CDATA[{}]]></bookpage></response>",
        encrypt(&svg, &key)
    )
}

/// Reader serving encrypted SVG pages `1..=count`, each 100 wide and `100 + page` high
pub(crate) fn image_reader(count: PageIndex) -> FakeReader {
    (1..=count).fold(FakeReader::default(), |reader, page| {
        reader.always(page, Reply::Body(image_body(100, 100 + page)))
    })
}

/// Reader serving text pages `1..=count`
pub(crate) fn text_reader(count: PageIndex) -> FakeReader {
    (1..=count).fold(FakeReader::default(), |reader, page| {
        reader.always(page, Reply::Body(text_body(&format!("Page {page} text"))))
    })
}

/// Config with fast retries and a short pending timeout
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.max_attempts = 3;
    config.retry.delay = Duration::from_millis(1);
    config.session.pending_timeout = Duration::from_millis(500);
    config.fetch.auth_token = Some("test-token".to_string());
    config
}

/// Collaborators wired to `reader`, with an empty catalog
pub(crate) fn sources(reader: Arc<FakeReader>) -> Sources {
    Sources {
        tokens: Arc::new(StaticTokenProvider::new(Some("test-token".to_string()))),
        pages: reader,
        metadata: Arc::new(FakeCatalog(Ok(DocumentMetadata::default()))),
        images: Arc::new(HttpImageSource::new(reqwest::Client::new())),
    }
}

/// Downloader over `reader` using [`test_config`]
pub(crate) async fn create_test_downloader(reader: Arc<FakeReader>) -> Downloader {
    Downloader::with_sources(test_config(), sources(reader))
        .await
        .unwrap()
}
