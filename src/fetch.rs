//! Per-page fetch with retries
//!
//! One attempt is: ask the token provider for a token, request the raw page, validate the body.
//! Any per-attempt failure is retried according to [`RetryConfig`]; running out of attempts turns
//! into [`FetchError::Exhausted`], which aborts the whole download.
//!
//! Remote images referenced by a vector page are downloaded once each by [`fetch_page_images`].
//! They are optional: a failed image is logged and left out.

use crate::assembly::svg;
use crate::config::RetryConfig;
use crate::error::FetchError;
use crate::retry::{RetryError, fetch_with_retry};
use crate::source::{AuthTokenProvider, ImageSource, PageSource, response};
use crate::types::{DocumentId, OutputFormat, PageContent, PageImage, PageIndex};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Fetches validated pages one at a time
#[derive(Clone)]
pub struct PageFetcher {
    tokens: Arc<dyn AuthTokenProvider>,
    pages: Arc<dyn PageSource>,
    retry: RetryConfig,
}

impl PageFetcher {
    /// Fetcher over the given collaborators
    pub fn new(
        tokens: Arc<dyn AuthTokenProvider>,
        pages: Arc<dyn PageSource>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            tokens,
            pages,
            retry,
        }
    }

    /// Fetch page `index`, retrying transient failures
    ///
    /// `on_retry` is told about every failed attempt that will be retried.
    pub async fn fetch_page(
        &self,
        source_id: &DocumentId,
        index: PageIndex,
        format: OutputFormat,
        cancel: &CancellationToken,
        on_retry: impl FnMut(u32, &FetchError),
    ) -> Result<PageContent, FetchError> {
        let result = fetch_with_retry(&self.retry, cancel, on_retry, |attempt| async move {
            tracing::debug!(page = index, attempt, "requesting page");
            self.attempt(source_id, index, format).await
        })
        .await;

        match result {
            Ok(payload) => Ok(PageContent::new(index, payload)),
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => Err(FetchError::Exhausted {
                page: index,
                attempts,
                last_error: last_error.to_string(),
            }),
            Err(RetryError::Permanent(e)) => Err(e),
            Err(RetryError::Cancelled) => Err(FetchError::Cancelled),
        }
    }

    async fn attempt(
        &self,
        source_id: &DocumentId,
        index: PageIndex,
        format: OutputFormat,
    ) -> Result<String, FetchError> {
        let token = self.tokens.auth_token(index).await?;
        let body = self
            .pages
            .fetch_raw_page(source_id, index, &token, format)
            .await?;
        response::extract_payload(&body, format)
    }
}

/// Download every remote image referenced by the decrypted `markup` of `page`
pub async fn fetch_page_images(
    source: &dyn ImageSource,
    page: PageIndex,
    markup: &str,
) -> Vec<PageImage> {
    let mut images = Vec::new();
    for href in svg::remote_image_hrefs(markup) {
        let url = match url::Url::parse(&href) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(page, href = %href, error = %e, "skipping malformed image reference");
                continue;
            }
        };
        match source.fetch_image(&url).await {
            Ok(bytes) => {
                tracing::debug!(page, href = %href, size = bytes.len(), "page image downloaded");
                images.push(PageImage { href, bytes });
            }
            Err(e) => {
                tracing::warn!(page, href = %href, error = %e, "page image download failed, rendering without it");
            }
        }
    }
    images
}

impl std::fmt::Debug for PageFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFetcher")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
