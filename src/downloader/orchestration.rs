//! Download execution: sequential page fetching feeding the assembly engine.
//!
//! Pages are fetched strictly one after another and pushed into the assembly queue in page
//! order. The fetch loop and the assembly worker run concurrently; this task listens to both
//! and to the download's cancellation token, and the first terminal outcome wins. A page that
//! exhausts its retries ends the loop before any later page is submitted, and dropping the
//! queue makes the worker discard the partial document.

use crate::assembly::{self, AssemblyEvent, AssemblyInit, AssemblyQueue};
use crate::cipher;
use crate::error::{AssemblyError, Error, FetchError, Result};
use crate::fetch::{PageFetcher, fetch_page_images};
use crate::progress::ProgressReporter;
use crate::types::{
    DocumentId, DocumentMetadata, DownloadId, DownloadOutput, DownloadRequest, Event,
    OutputFormat, ReleaseReason,
};
use crate::utils::{get_unique_path, sanitize_filename};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::{Downloader, Reservation, control};

impl Downloader {
    pub(crate) async fn run_download(&self, reservation: Reservation) -> Result<DownloadOutput> {
        let Reservation { id, request, owner } = reservation;

        let cancel = self.session.start(id, owner).await?;
        tracing::info!(
            download_id = id.0,
            source_id = %request.source_id,
            pages = request.page_count(),
            format = %request.format,
            "download started"
        );
        self.emit_event(Event::Started { id });

        let result = self.execute(id, &request, &cancel).await;

        let reason = match &result {
            Ok(output) => {
                tracing::info!(
                    download_id = id.0,
                    filename = %output.filename,
                    size_bytes = output.bytes.len(),
                    "download complete"
                );
                *self.last_output.write().await = Some(output.clone());
                self.emit_event(Event::Complete {
                    id,
                    filename: output.filename.clone(),
                    size_bytes: output.bytes.len() as u64,
                    path: output.path.clone(),
                });
                ReleaseReason::Completed
            }
            Err(e) => {
                tracing::error!(download_id = id.0, error = %e, "download failed");
                self.emit_event(Event::Failed {
                    id,
                    error: e.to_string(),
                });
                match e {
                    Error::Stopped { .. } => ReleaseReason::Stopped,
                    _ => ReleaseReason::Failed,
                }
            }
        };

        if let Err(e) = self.session.release(id, reason).await {
            tracing::debug!(download_id = id.0, error = %e, "slot already gone on release");
        }

        result
    }

    async fn execute(
        &self,
        id: DownloadId,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<DownloadOutput> {
        let key = control::request_key(request)?;
        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.config.output.default_title)
            .to_string();

        let metadata = match request.format {
            OutputFormat::TextContainer => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Stopped { id }),
                    metadata = self.lookup_metadata(&request.source_id) => metadata,
                }
            }
            OutputFormat::ImageContainer => DocumentMetadata::default(),
        };

        let init = AssemblyInit {
            document_id: request.source_id.clone(),
            title: title.clone(),
            author: metadata.author,
            toc: metadata.toc,
            range_start: request.range_start,
            key,
        };

        let (queue, mut assembly_events) =
            assembly::spawn_engine(request.format, self.config.assembly.clone());
        let mut reporter = ProgressReporter::new(
            id,
            request.page_count(),
            self.event_tx.clone(),
            self.session.clone(),
        );

        let feed = self.feed_pages(id, request, queue, init, cancel);
        tokio::pin!(feed);
        let mut feeding = true;

        let bytes = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(Error::Stopped { id }),

                event = assembly_events.recv() => match event {
                    Some(AssemblyEvent::PageAdded { pages_done, .. }) => {
                        reporter.page_added(pages_done).await;
                    }
                    Some(AssemblyEvent::Done(bytes)) => break bytes,
                    Some(AssemblyEvent::Failed(e)) => return Err(e.into()),
                    None => {
                        return Err(AssemblyError::Aborted(
                            "assembly worker stopped without a result".to_string(),
                        )
                        .into());
                    }
                },

                fed = &mut feed, if feeding => {
                    feeding = false;
                    match fed {
                        Ok(()) => {}
                        // The worker failed; its Failed event carries the real cause
                        Err(Error::Assembly(AssemblyError::Aborted(_))) => {}
                        Err(Error::Fetch(FetchError::Cancelled)) => {
                            return Err(Error::Stopped { id });
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        };

        let filename = format!(
            "{}.{}",
            sanitize_filename(&title, &self.config.output.default_title),
            request.format.extension()
        );
        let path = match &self.config.output.output_dir {
            Some(dir) => self.write_output(dir, &filename, &bytes).await?,
            None => None,
        };

        Ok(DownloadOutput {
            id,
            bytes,
            filename,
            format: request.format,
            path,
        })
    }

    /// Push init, every page in order, then finalize into the assembly queue
    ///
    /// Vector pages get their remote images downloaded before they are queued.
    /// Owns `queue`: when this future ends or is dropped, the engine sees its channel close.
    async fn feed_pages(
        &self,
        id: DownloadId,
        request: &DownloadRequest,
        queue: AssemblyQueue,
        init: AssemblyInit,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let key = init.key.clone();
        queue.init(init).await?;

        let fetcher = PageFetcher::new(
            self.sources.tokens.clone(),
            self.sources.pages.clone(),
            self.config.retry.clone(),
        );
        let max_attempts = self.config.retry.max_attempts;

        for index in request.range_start..=request.range_end {
            let mut page = fetcher
                .fetch_page(
                    &request.source_id,
                    index,
                    request.format,
                    cancel,
                    |attempt, error| {
                        self.emit_event(Event::PageRetry {
                            id,
                            page: index,
                            attempt,
                            max_attempts,
                            error: error.to_string(),
                        });
                    },
                )
                .await?;
            if let Some(key) = &key {
                let markup = cipher::decrypt_with(&page.payload, key);
                page.images =
                    fetch_page_images(self.sources.images.as_ref(), index, &markup).await;
            }
            queue.add_page(page).await?;
        }

        queue.finalize().await?;
        Ok(())
    }

    /// Catalog author and TOC; lookup failures degrade to "unknown author, no TOC"
    async fn lookup_metadata(&self, source_id: &DocumentId) -> DocumentMetadata {
        match self.sources.metadata.document_metadata(source_id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(
                    source_id = %source_id,
                    error = %e,
                    "catalog lookup failed, continuing without author and table of contents"
                );
                DocumentMetadata::default()
            }
        }
    }

    async fn write_output(
        &self,
        dir: &Path,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Option<PathBuf>> {
        let Some(path) = get_unique_path(&dir.join(filename), self.config.output.file_collision)?
        else {
            tracing::info!(filename, "output file exists, skipping write");
            return Ok(None);
        };

        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), "document written");
        Ok(Some(path))
    }
}
