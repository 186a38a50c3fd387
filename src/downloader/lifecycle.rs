//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::sync::atomic::Ordering;

use super::Downloader;

impl Downloader {
    /// Shut the downloader down
    ///
    /// 1. Stops accepting new reservations
    /// 2. Releases the session slot, cancelling the in-flight download if there is one
    /// 3. Emits [`Event::Shutdown`]
    ///
    /// A running [`run`](Self::run) call returns [`Error::Stopped`](crate::Error::Stopped)
    /// shortly after. Calling this more than once is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);

        match self.session.shutdown().await {
            Ok(Some(id)) => {
                tracing::info!(download_id = id.0, "Cancelled in-flight download");
            }
            Ok(None) => {}
            Err(_) => {
                tracing::debug!("Session already shut down");
            }
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Whether new reservations are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }
}
