//! Collaborators that talk to the remote reader
//!
//! The download pipeline needs these capabilities from the outside world:
//! - [`AuthTokenProvider`]: a bearer token for a given page
//! - [`PageSource`]: the raw response body for one page
//! - [`MetadataSource`]: author and table of contents for the text container
//! - [`ImageSource`]: remote images referenced by vector pages
//!
//! [`Sources::http`] wires up the reqwest-based implementations; tests and embedders can inject
//! their own through [`Downloader::with_sources`](crate::Downloader::with_sources).

mod catalog;
mod http;
pub mod response;

pub use catalog::{HttpCatalog, parse_catalog};
pub use http::{HttpImageSource, HttpPageSource};

use crate::config::FetchConfig;
use crate::error::{Error, FetchError, Result};
use crate::types::{DocumentId, DocumentMetadata, OutputFormat, PageIndex};
use async_trait::async_trait;
use std::sync::Arc;

/// Supplies the authorization token for a page request
#[async_trait]
pub trait AuthTokenProvider: Send + Sync {
    /// Token to send with the request for `page`
    async fn auth_token(&self, page: PageIndex) -> std::result::Result<String, FetchError>;
}

/// Fetches the raw response body of one page
#[async_trait]
pub trait PageSource: Send + Sync {
    /// One request for `page` of `source_id`; the body is validated by the caller
    async fn fetch_raw_page(
        &self,
        source_id: &DocumentId,
        page: PageIndex,
        token: &str,
        format: OutputFormat,
    ) -> std::result::Result<String, FetchError>;
}

/// Looks up catalog metadata for a document
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Author and table of contents of `source_id`
    async fn document_metadata(
        &self,
        source_id: &DocumentId,
    ) -> std::result::Result<DocumentMetadata, FetchError>;
}

/// Downloads images referenced by page markup
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// One request for `url`, returning the response body
    async fn fetch_image(&self, url: &url::Url) -> std::result::Result<Vec<u8>, FetchError>;
}

/// Token provider that hands out one configured token for every page
#[derive(Clone, Debug, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    /// Provider for `token`; `None` makes every request fail with [`FetchError::NoAuthToken`]
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl AuthTokenProvider for StaticTokenProvider {
    async fn auth_token(&self, _page: PageIndex) -> std::result::Result<String, FetchError> {
        self.token.clone().ok_or(FetchError::NoAuthToken)
    }
}

/// The set of collaborators a [`Downloader`](crate::Downloader) works with
#[derive(Clone)]
pub struct Sources {
    /// Authorization bridge
    pub tokens: Arc<dyn AuthTokenProvider>,
    /// Page fetcher
    pub pages: Arc<dyn PageSource>,
    /// Catalog lookup
    pub metadata: Arc<dyn MetadataSource>,
    /// Remote image downloads
    pub images: Arc<dyn ImageSource>,
}

impl Sources {
    /// HTTP collaborators sharing one connection pool
    pub fn http(config: &FetchConfig) -> Result<Self> {
        let client = build_client(config)?;
        Ok(Self {
            tokens: Arc::new(StaticTokenProvider::new(config.auth_token.clone())),
            pages: Arc::new(HttpPageSource::new(client.clone(), config)?),
            metadata: Arc::new(HttpCatalog::new(client.clone(), config)?),
            images: Arc::new(HttpImageSource::new(client)),
        })
    }
}

impl std::fmt::Debug for Sources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sources").finish_non_exhaustive()
    }
}

fn build_client(config: &FetchConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout)
        .build()
        .map_err(Error::Network)
}

/// Resolve `path` against the configured origin
pub(crate) fn endpoint(config: &FetchConfig, path: &str) -> Result<url::Url> {
    let base = url::Url::parse(&config.base_url).map_err(|e| Error::Config {
        message: format!("invalid base_url {}: {e}", config.base_url),
        key: Some("fetch.base_url".to_string()),
    })?;
    base.join(path).map_err(|e| Error::Config {
        message: format!("invalid endpoint path {path}: {e}"),
        key: Some("fetch.page_path".to_string()),
    })
}
