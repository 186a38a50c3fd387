//! Core downloader implementation split into focused submodules.
//!
//! The `Downloader` handle and its methods are organized by domain:
//! - [`session`] - The single download slot and its state machine
//! - [`control`] - Admission, run, stop and state queries
//! - [`orchestration`] - The fetch loop feeding the assembly engine
//! - [`lifecycle`] - Shutdown coordination

mod control;
mod lifecycle;
mod orchestration;
pub mod session;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use session::{Reservation, SessionHandle};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::source::Sources;
use crate::types::{DownloadId, DownloadOutput, Event};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{RwLock, broadcast};

/// Events buffered per subscriber before it starts lagging
const EVENT_BUFFER: usize = 1000;

/// Main downloader handle
///
/// Cheap to clone; every clone talks to the same session slot and event channel.
#[derive(Clone, Debug)]
pub struct Downloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// The single download slot
    pub(crate) session: SessionHandle,
    /// Remote reader collaborators
    pub(crate) sources: Sources,
    /// Cleared on shutdown; reservations are refused afterwards
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Most recently finished document, stored before its `Complete` event is sent
    pub(crate) last_output: Arc<RwLock<Option<DownloadOutput>>>,
}

impl Downloader {
    /// Create a new Downloader talking to the reader over HTTP
    ///
    /// Validates the configuration, creates the output directory when one is configured and
    /// starts the session slot.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let sources = Sources::http(&config.fetch)?;
        Self::with_sources(config, sources).await
    }

    /// Create a Downloader with custom collaborators
    pub async fn with_sources(config: Config, sources: Sources) -> Result<Self> {
        config.validate()?;

        if let Some(dir) = &config.output.output_dir {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create output directory '{}': {}",
                        dir.display(),
                        e
                    ),
                ))
            })?;
        }

        let (event_tx, _rx) = broadcast::channel(EVENT_BUFFER);
        let session = session::spawn_session(config.session.pending_timeout, event_tx.clone());

        Ok(Self {
            config: Arc::new(config),
            event_tx,
            session,
            sources,
            accepting_new: Arc::new(AtomicBool::new(true)),
            last_output: Arc::new(RwLock::new(None)),
        })
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// If a subscriber falls behind by more than 1000 events it receives
    /// `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use folio_dl::{Config, Downloader};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = Downloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "download event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The finished document of download `id`, if it is the most recent one
    ///
    /// Available from the moment [`Event::Complete`] is sent for `id` until the next download
    /// completes.
    pub async fn finished_output(&self, id: DownloadId) -> Option<DownloadOutput> {
        self.last_output
            .read()
            .await
            .as_ref()
            .filter(|output| output.id == id)
            .cloned()
    }

    /// Emit an event to all subscribers; dropped silently when nobody listens
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = Arc::new(self.clone());
        let config = Arc::clone(&self.config);

        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}
