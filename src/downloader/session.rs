//! The single download session slot
//!
//! At most one download is admitted at a time. The slot moves through
//! `Idle -> Pending -> Active -> Idle`:
//! - `attempt_start` reserves the slot (`Pending`) and arms the pending timeout
//! - `start` promotes the reservation (`Active`) and disarms the timeout
//! - `progress` records the last reported percentage
//! - `stop`, `release`, timeout expiry and shutdown return the slot to `Idle`
//!
//! All transitions happen on one actor task that owns the [`Slot`] value; callers talk to it
//! through a cloneable [`SessionHandle`]. Every reply travels on a oneshot channel, so the
//! order in which commands reach the actor is the order in which they take effect.

use crate::error::{AdmissionError, Error, Result};
use crate::types::{
    DownloadId, DownloadRequest, Event, OwnerId, ReleaseReason, SessionState,
};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const COMMAND_BUFFER: usize = 64;

/// An admitted download waiting to be run
#[derive(Clone, Debug)]
pub struct Reservation {
    /// Download ID assigned at admission
    pub id: DownloadId,
    /// The admitted request
    pub request: DownloadRequest,
    /// Owner recorded at admission
    pub owner: Option<OwnerId>,
}

#[derive(Debug)]
struct Record {
    id: DownloadId,
    request: DownloadRequest,
    owner: Option<OwnerId>,
    cancel: CancellationToken,
}

impl Record {
    /// Whether a stop from `owner` applies to this download
    ///
    /// A stop without an owner is unconditional; one with an owner only matches the owner
    /// recorded for the download.
    fn owned_by(&self, owner: Option<&OwnerId>) -> bool {
        match owner {
            None => true,
            Some(owner) => self.owner.as_ref() == Some(owner),
        }
    }
}

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Idle,
    Pending {
        record: Record,
        deadline: Instant,
    },
    Active {
        record: Record,
        last_progress: u8,
    },
}

impl Slot {
    fn record(&self) -> Option<&Record> {
        match self {
            Slot::Idle => None,
            Slot::Pending { record, .. } | Slot::Active { record, .. } => Some(record),
        }
    }

    fn deadline(&self) -> Option<Instant> {
        match self {
            Slot::Pending { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    fn snapshot(&self) -> SessionState {
        match self {
            Slot::Idle => SessionState::Idle,
            Slot::Pending { record, .. } => SessionState::Pending {
                id: record.id,
                request: record.request.clone(),
            },
            Slot::Active {
                record,
                last_progress,
            } => SessionState::Active {
                id: record.id,
                request: record.request.clone(),
                last_progress: *last_progress,
            },
        }
    }

    /// Return to `Idle`, handing back whatever was admitted
    fn take(&mut self) -> Option<Record> {
        match std::mem::take(self) {
            Slot::Idle => None,
            Slot::Pending { record, .. } | Slot::Active { record, .. } => Some(record),
        }
    }
}

enum Command {
    AttemptStart {
        request: DownloadRequest,
        owner: Option<OwnerId>,
        reply: oneshot::Sender<std::result::Result<Reservation, AdmissionError>>,
    },
    Start {
        id: DownloadId,
        owner: Option<OwnerId>,
        reply: oneshot::Sender<std::result::Result<CancellationToken, AdmissionError>>,
    },
    Progress {
        id: DownloadId,
        percent: u8,
    },
    Stop {
        owner: Option<OwnerId>,
        reply: oneshot::Sender<bool>,
    },
    Release {
        id: DownloadId,
        reason: ReleaseReason,
        reply: oneshot::Sender<()>,
    },
    GetState {
        reply: oneshot::Sender<SessionState>,
    },
    Shutdown {
        reply: oneshot::Sender<Option<DownloadId>>,
    },
}

struct SessionActor {
    slot: Slot,
    next_id: u64,
    pending_timeout: Duration,
    events: broadcast::Sender<Event>,
}

impl SessionActor {
    fn attempt_start(
        &mut self,
        request: DownloadRequest,
        owner: Option<OwnerId>,
    ) -> std::result::Result<Reservation, AdmissionError> {
        if let Some(active) = self.slot.record() {
            tracing::debug!(
                active_id = active.id.0,
                "rejecting reservation, slot is taken"
            );
            return Err(AdmissionError::DownloadInProgress { active: active.id });
        }

        let id = DownloadId(self.next_id);
        self.next_id += 1;

        let record = Record {
            id,
            request: request.clone(),
            owner: owner.clone(),
            cancel: CancellationToken::new(),
        };
        self.slot = Slot::Pending {
            record,
            deadline: Instant::now() + self.pending_timeout,
        };

        tracing::info!(
            download_id = id.0,
            source_id = %request.source_id,
            range_start = request.range_start,
            range_end = request.range_end,
            format = %request.format,
            "download reserved"
        );
        self.events
            .send(Event::Reserved {
                id,
                source_id: request.source_id.clone(),
                range_start: request.range_start,
                range_end: request.range_end,
                format: request.format,
            })
            .ok();

        Ok(Reservation { id, request, owner })
    }

    fn start(
        &mut self,
        id: DownloadId,
        owner: Option<OwnerId>,
    ) -> std::result::Result<CancellationToken, AdmissionError> {
        match std::mem::take(&mut self.slot) {
            Slot::Pending { mut record, .. } if record.id == id => {
                // The reserving owner keeps the slot
                if record.owner.is_none() {
                    record.owner = owner;
                }
                let token = record.cancel.clone();
                self.slot = Slot::Active {
                    record,
                    last_progress: 0,
                };
                tracing::debug!(download_id = id.0, "reservation promoted to active");
                Ok(token)
            }
            other => {
                self.slot = other;
                Err(AdmissionError::ReservationExpired { id })
            }
        }
    }

    fn progress(&mut self, id: DownloadId, percent: u8) {
        if let Slot::Active {
            record,
            last_progress,
        } = &mut self.slot
        {
            if record.id == id {
                *last_progress = (*last_progress).max(percent);
            }
        }
    }

    fn stop(&mut self, owner: Option<OwnerId>) -> bool {
        let matches = self
            .slot
            .record()
            .is_some_and(|record| record.owned_by(owner.as_ref()));
        if !matches {
            tracing::debug!(?owner, "stop ignored, no matching download");
            return false;
        }
        self.release_current(ReleaseReason::Stopped);
        true
    }

    fn release(&mut self, id: DownloadId, reason: ReleaseReason) {
        if self.slot.record().is_some_and(|record| record.id == id) {
            self.release_current(reason);
        }
    }

    fn expire(&mut self) {
        tracing::info!("pending reservation was never started, releasing slot");
        self.release_current(ReleaseReason::Expired);
    }

    fn release_current(&mut self, reason: ReleaseReason) -> Option<DownloadId> {
        let record = self.slot.take()?;
        record.cancel.cancel();
        tracing::info!(download_id = record.id.0, ?reason, "session slot released");
        self.events
            .send(Event::Released {
                id: record.id,
                reason,
            })
            .ok();
        Some(record.id)
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_actor(mut actor: SessionActor, mut commands: mpsc::Receiver<Command>) {
    loop {
        let deadline = actor.slot.deadline();
        tokio::select! {
            biased;

            _ = deadline_elapsed(deadline) => actor.expire(),

            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                match command {
                    Command::AttemptStart { request, owner, reply } => {
                        let _ = reply.send(actor.attempt_start(request, owner));
                    }
                    Command::Start { id, owner, reply } => {
                        let _ = reply.send(actor.start(id, owner));
                    }
                    Command::Progress { id, percent } => actor.progress(id, percent),
                    Command::Stop { owner, reply } => {
                        let _ = reply.send(actor.stop(owner));
                    }
                    Command::Release { id, reason, reply } => {
                        actor.release(id, reason);
                        let _ = reply.send(());
                    }
                    Command::GetState { reply } => {
                        let _ = reply.send(actor.slot.snapshot());
                    }
                    Command::Shutdown { reply } => {
                        let released = actor.release_current(ReleaseReason::Shutdown);
                        let _ = reply.send(released);
                        break;
                    }
                }
            }
        }
    }
    tracing::debug!("session actor stopped");
}

/// Spawn the slot actor and return a handle to it
pub(crate) fn spawn_session(
    pending_timeout: Duration,
    events: broadcast::Sender<Event>,
) -> SessionHandle {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let actor = SessionActor {
        slot: Slot::Idle,
        next_id: 1,
        pending_timeout,
        events,
    };
    tokio::spawn(run_actor(actor, rx));
    SessionHandle { commands: tx }
}

/// Cloneable handle to the session slot
///
/// Once the actor has shut down every request fails with [`Error::ShuttingDown`].
#[derive(Clone, Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::AttemptStart { .. } => "AttemptStart",
            Command::Start { .. } => "Start",
            Command::Progress { .. } => "Progress",
            Command::Stop { .. } => "Stop",
            Command::Release { .. } => "Release",
            Command::GetState { .. } => "GetState",
            Command::Shutdown { .. } => "Shutdown",
        };
        f.write_str(name)
    }
}

impl SessionHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| Error::ShuttingDown)?;
        rx.await.map_err(|_| Error::ShuttingDown)
    }

    /// Reserve the slot for `request` (`Idle -> Pending`)
    pub async fn attempt_start(
        &self,
        request: DownloadRequest,
        owner: Option<OwnerId>,
    ) -> Result<Reservation> {
        let admitted = self
            .request(|reply| Command::AttemptStart {
                request,
                owner,
                reply,
            })
            .await?;
        Ok(admitted?)
    }

    /// Promote reservation `id` (`Pending -> Active`)
    ///
    /// `owner` is recorded only when the reservation was made without one.
    ///
    /// Returns the token that is cancelled when the download is stopped or the slot released.
    pub async fn start(&self, id: DownloadId, owner: Option<OwnerId>) -> Result<CancellationToken> {
        let started = self
            .request(|reply| Command::Start { id, owner, reply })
            .await?;
        Ok(started?)
    }

    /// Record the progress of the active download
    pub async fn progress(&self, id: DownloadId, percent: u8) {
        let _ = self.commands.send(Command::Progress { id, percent }).await;
    }

    /// Stop whatever holds the slot, if `owner` matches; returns whether anything was stopped
    pub async fn stop(&self, owner: Option<OwnerId>) -> Result<bool> {
        self.request(|reply| Command::Stop { owner, reply }).await
    }

    /// Release the slot held by `id`; a no-op if `id` no longer holds it
    pub async fn release(&self, id: DownloadId, reason: ReleaseReason) -> Result<()> {
        self.request(|reply| Command::Release { id, reason, reply })
            .await
    }

    /// Snapshot of the slot
    pub async fn state(&self) -> Result<SessionState> {
        self.request(|reply| Command::GetState { reply }).await
    }

    /// Release the slot and stop the actor
    pub async fn shutdown(&self) -> Result<Option<DownloadId>> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
