//! Download admission and control (reserve, run, stop, state)

use crate::cipher::CipherKey;
use crate::error::{AdmissionError, Error, Result};
use crate::types::{DownloadOutput, DownloadRequest, OutputFormat, OwnerId, SessionState};
use std::sync::atomic::Ordering;

use super::{Downloader, Reservation};

impl Downloader {
    /// Admit `request` into the session slot
    ///
    /// The request is validated first: the page range must satisfy `1 <= start <= end` and the
    /// image container needs a credential with a numeric key prefix. On success the slot is
    /// `Pending` until [`run`](Self::run) starts it or the pending timeout expires.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    /// - [`AdmissionError::InvalidRange`] / [`AdmissionError::MissingCredential`] for bad input
    /// - [`AdmissionError::DownloadInProgress`] when another download holds the slot
    pub async fn reserve(
        &self,
        request: DownloadRequest,
        owner: Option<OwnerId>,
    ) -> Result<Reservation> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        validate_range(&request)?;
        request_key(&request)?;

        self.session.attempt_start(request, owner).await
    }

    /// Start a reserved download and drive it to completion
    ///
    /// The slot is released whatever the outcome. Subscribers see exactly one of
    /// [`Event::Complete`](crate::types::Event::Complete) or
    /// [`Event::Failed`](crate::types::Event::Failed) for the download.
    pub async fn run(&self, reservation: Reservation) -> Result<DownloadOutput> {
        self.run_download(reservation).await
    }

    /// [`reserve`](Self::reserve) followed by [`run`](Self::run)
    pub async fn download(
        &self,
        request: DownloadRequest,
        owner: Option<OwnerId>,
    ) -> Result<DownloadOutput> {
        let reservation = self.reserve(request, owner).await?;
        self.run(reservation).await
    }

    /// Stop the current download
    ///
    /// With `Some(owner)` the stop only applies when the download belongs to that owner. Returns
    /// whether a download was stopped.
    pub async fn stop(&self, owner: Option<OwnerId>) -> bool {
        match self.session.stop(owner).await {
            Ok(stopped) => stopped,
            Err(e) => {
                tracing::debug!(error = %e, "stop requested after session shut down");
                false
            }
        }
    }

    /// Current session state; never changes it
    pub async fn state(&self) -> SessionState {
        self.session.state().await.unwrap_or(SessionState::Idle)
    }
}

fn validate_range(request: &DownloadRequest) -> std::result::Result<(), AdmissionError> {
    if request.range_start < 1 || request.range_start > request.range_end {
        return Err(AdmissionError::InvalidRange {
            start: request.range_start,
            end: request.range_end,
        });
    }
    Ok(())
}

/// Decryption key carried by `request`; always `None` for the text container
pub(crate) fn request_key(
    request: &DownloadRequest,
) -> std::result::Result<Option<CipherKey>, AdmissionError> {
    if request.format != OutputFormat::ImageContainer {
        return Ok(None);
    }

    let credential = request
        .credential
        .as_deref()
        .ok_or_else(|| AdmissionError::MissingCredential {
            reason: "no credential supplied".to_string(),
        })?;

    CipherKey::from_credential(credential)
        .map(Some)
        .map_err(|e| AdmissionError::MissingCredential {
            reason: e.to_string(),
        })
}
