//! Bounded-concurrency download dispatcher
//!
//! The dispatcher never talks to the backend itself. Each method updates
//! its bookkeeping and returns the download requests the caller has to
//! submit, which keeps every decision testable without I/O.

use crate::config::Preferences;
use crate::download::backend::{DownloadDelta, DownloadId, DownloadOptions, DownloadState, InterruptReason};
use crate::processor::ProcessorId;
use std::collections::{HashMap, VecDeque};
use tokio::sync::watch;

/// The download link a request or download belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkRef {
    pub processor_id: ProcessorId,
    pub link_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub link: LinkRef,
    pub options: DownloadOptions,
}

/// Decision taken for a new request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Submit the request to the backend now
    Launch(DownloadRequest),
    /// The request waits for a free slot
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Complete,
    Interrupted(InterruptReason),
}

/// A download that reached a terminal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: DownloadId,
    pub link: LinkRef,
    pub outcome: DownloadOutcome,
    /// Waiting request promoted into the freed slot
    pub next: Option<DownloadRequest>,
}

/// Limits how many downloads run at once
///
/// The limit is read from the preferences on every decision, so a change
/// applies without rebuilding the dispatcher. A limit of zero or less means
/// unlimited.
#[derive(Debug)]
pub struct DownloadDispatcher {
    preferences: watch::Receiver<Preferences>,
    in_flight: usize,
    waiting: VecDeque<DownloadRequest>,
    active: HashMap<DownloadId, LinkRef>,
    /// Terminal states reported before the backend's acceptance reached us
    early: HashMap<DownloadId, DownloadState>,
}

impl DownloadDispatcher {
    pub fn new(preferences: watch::Receiver<Preferences>) -> Self {
        Self {
            preferences,
            in_flight: 0,
            waiting: VecDeque::new(),
            active: HashMap::new(),
            early: HashMap::new(),
        }
    }

    fn has_capacity(&self) -> bool {
        let max = self.preferences.borrow().max_parallel_downloads;
        max <= 0 || (self.in_flight as i64) < max
    }

    /// Submissions sent to the backend that have not been answered yet
    fn pending_submissions(&self) -> usize {
        self.in_flight.saturating_sub(self.active.len())
    }

    fn take_waiting(&mut self) -> Option<DownloadRequest> {
        if !self.has_capacity() {
            return None;
        }
        let request = self.waiting.pop_front()?;
        self.in_flight += 1;
        Some(request)
    }

    pub fn start_download(&mut self, request: DownloadRequest) -> Dispatch {
        if self.has_capacity() {
            self.in_flight += 1;
            Dispatch::Launch(request)
        } else {
            tracing::debug!(
                "Deferring {} ({} in flight, {} waiting)",
                request.options.url,
                self.in_flight,
                self.waiting.len()
            );
            self.waiting.push_back(request);
            Dispatch::Deferred
        }
    }

    /// Records a download the backend accepted
    ///
    /// Returns a completion when the backend already reported the end of
    /// this download.
    pub fn on_accepted(&mut self, id: DownloadId, link: LinkRef) -> Option<Completion> {
        self.active.insert(id, link);
        let state = self.early.remove(&id)?;
        let completion = self.on_download_changed(DownloadDelta {
            id,
            state: Some(state),
        });
        if self.pending_submissions() == 0 {
            self.early.clear();
        }
        completion
    }

    /// Frees the slot of a rejected submission
    pub fn on_rejected(&mut self) -> Option<DownloadRequest> {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.pending_submissions() == 0 {
            self.early.clear();
        }
        self.take_waiting()
    }

    /// Handles a backend delta
    ///
    /// Deltas without a state, non-terminal deltas and deltas about
    /// downloads this dispatcher did not start are ignored.
    pub fn on_download_changed(&mut self, delta: DownloadDelta) -> Option<Completion> {
        let state = delta.state?;
        let outcome = match state {
            DownloadState::InProgress => return None,
            DownloadState::Complete => DownloadOutcome::Complete,
            DownloadState::Interrupted(reason) => DownloadOutcome::Interrupted(reason),
        };

        let Some(link) = self.active.remove(&delta.id) else {
            if self.pending_submissions() > 0 {
                self.early.insert(delta.id, state);
            }
            return None;
        };

        self.in_flight = self.in_flight.saturating_sub(1);
        Some(Completion {
            id: delta.id,
            link,
            outcome,
            next: self.take_waiting(),
        })
    }

    /// Starts as many waiting requests as the current limit allows
    pub fn on_preferences_changed(&mut self) -> Vec<DownloadRequest> {
        let mut launched = Vec::new();
        while let Some(request) = self.take_waiting() {
            launched.push(request);
        }
        launched
    }

    pub fn hide_successful_downloads(&self) -> bool {
        self.preferences.borrow().hide_successful_downloads
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.waiting.is_empty()
    }
}
