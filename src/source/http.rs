//! reqwest-based page and image sources

use super::{ImageSource, PageSource, endpoint};
use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::types::{DocumentId, OutputFormat, PageIndex};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, COOKIE};

/// Fetches pages from the reader's page endpoint
#[derive(Clone, Debug)]
pub struct HttpPageSource {
    client: reqwest::Client,
    page_endpoint: url::Url,
    cookie: Option<String>,
}

impl HttpPageSource {
    /// Page source using `client` against `config.base_url`
    pub fn new(client: reqwest::Client, config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client,
            page_endpoint: endpoint(config, &config.page_path)?,
            cookie: config.cookie.clone(),
        })
    }

    /// URL of one page request
    ///
    /// Text pages ask for `text=1&q=`, image pages for `d=&t=svg`.
    pub fn page_url(
        &self,
        source_id: &DocumentId,
        page: PageIndex,
        format: OutputFormat,
    ) -> url::Url {
        let mut url = self.page_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("doc", source_id.as_str())
                .append_pair("page", &page.to_string())
                .append_pair("current", "1");
            match format {
                OutputFormat::TextContainer => {
                    query.append_pair("text", "1").append_pair("q", "");
                }
                OutputFormat::ImageContainer => {
                    query.append_pair("d", "").append_pair("t", "svg");
                }
            }
        }
        url
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_raw_page(
        &self,
        source_id: &DocumentId,
        page: PageIndex,
        token: &str,
        format: OutputFormat,
    ) -> std::result::Result<String, FetchError> {
        let url = self.page_url(source_id, page, format);

        let mut request = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {token}"));
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyResponse);
        }

        Ok(body)
    }
}

/// Fetches images referenced by page markup
///
/// Image hosts are arbitrary, so no reader credentials are sent.
#[derive(Clone, Debug)]
pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    /// Image source using `client`
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch_image(&self, url: &url::Url) -> std::result::Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        if body.is_empty() {
            return Err(FetchError::EmptyResponse);
        }

        Ok(body.to_vec())
    }
}
