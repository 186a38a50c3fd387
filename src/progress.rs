//! Download progress reporting
//!
//! [`ProgressTracker`] turns "page i of M assembled" into a percentage that never goes backwards
//! and never reaches 100 before the document is actually finished: the completion event is the
//! only thing that means 100%. [`ProgressReporter`] publishes each value on the event channel and
//! records it in the session slot so late subscribers can ask for the current state.

use crate::downloader::session::SessionHandle;
use crate::types::{DownloadId, Event};
use tokio::sync::broadcast;

/// Highest percentage reported before completion
pub const MAX_IN_PROGRESS_PERCENT: u8 = 99;

/// Percentage bookkeeping for one download
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    total: u32,
    done: u32,
    last: u8,
}

impl ProgressTracker {
    /// Tracker for a download of `total` pages
    pub fn new(total: u32) -> Self {
        Self {
            total,
            done: 0,
            last: 0,
        }
    }

    /// Record `pages_done` pages and return the percentage to report
    ///
    /// The value is `ceil(pages_done * 100 / total)`, clamped to 99 and never lower than the
    /// previous value. For three pages this yields 34, 67, 99.
    ///
    /// Fractions round up, not to nearest: the first of three pages reports 34, not 33, and
    /// the first of seven reports 15, not 14.
    pub fn update(&mut self, pages_done: u32) -> u8 {
        self.done = self.done.max(pages_done);
        let percent = percent_of(self.done, self.total).min(MAX_IN_PROGRESS_PERCENT);
        self.last = self.last.max(percent);
        self.last
    }

    /// Pages recorded so far
    pub fn pages_done(&self) -> u32 {
        self.done
    }

    /// Pages in the download
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Last reported percentage
    pub fn last_percent(&self) -> u8 {
        self.last
    }
}

fn percent_of(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let done = u64::from(done.min(total));
    let total = u64::from(total);
    // ceil(done * 100 / total), at most 100
    ((done * 100).div_ceil(total)) as u8
}

/// Publishes progress of one download
#[derive(Debug)]
pub struct ProgressReporter {
    id: DownloadId,
    tracker: ProgressTracker,
    events: broadcast::Sender<Event>,
    session: SessionHandle,
}

impl ProgressReporter {
    /// Reporter for download `id` of `total` pages
    pub fn new(
        id: DownloadId,
        total: u32,
        events: broadcast::Sender<Event>,
        session: SessionHandle,
    ) -> Self {
        Self {
            id,
            tracker: ProgressTracker::new(total),
            events,
            session,
        }
    }

    /// Report that `pages_done` pages are in the document
    pub async fn page_added(&mut self, pages_done: u32) {
        let previous = self.tracker.last_percent();
        let percent = self.tracker.update(pages_done);

        // Slot first, so a state query issued after the event sees this value
        if percent != previous {
            self.session.progress(self.id, percent).await;
        }

        self.events
            .send(Event::Progress {
                id: self.id,
                percent,
                pages_done: self.tracker.pages_done(),
                pages_total: self.tracker.total(),
            })
            .ok();
    }

    /// Last reported percentage
    pub fn last_percent(&self) -> u8 {
        self.tracker.last_percent()
    }
}
