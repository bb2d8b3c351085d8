//! Harvest session - the discovery and download pipeline
//!
//! A [`Session`] owns the processing queue, the download dispatcher and the
//! already-visited cache. It is the only code touching them: fetches and
//! download submissions run as spawned tasks that report back through the
//! session's event channel, and backend deltas and preference changes are
//! received on their own channels. `run` processes all of these one at a
//! time until the pipeline has nothing left to do.

use crate::config::{ConflictAction, Preferences};
use crate::crawler::fetcher::{FetchFailure, FetchedDocument, RemoteFetcher};
use crate::crawler::scheduler::{JobHandler, ProcessingQueue};
use crate::dictionary::Dictionary;
use crate::download::{
    Completion, Dispatch, DownloadBackend, DownloadDelta, DownloadDispatcher, DownloadId,
    DownloadOptions, DownloadOutcome, DownloadRequest, InterruptReason, LinkRef,
};
use crate::extract::{Extractor, FoundLink};
use crate::output::{ProcessorSnapshot, SessionStatistics, ViewSink};
use crate::processor::handler::{self, HandleStep};
use crate::processor::{DownloadLink, PageSource, Processor, ProcessorFactory, ProcessorId};
use crate::state::{LinkStatus, ProcessorStatus, VisitedCache};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Work reported back to the session
#[derive(Debug)]
pub enum SessionEvent {
    /// The queue dequeued this processor
    Handle(ProcessorId),
    FetchDone {
        processor_id: ProcessorId,
        attempt: u32,
        result: Result<FetchedDocument, FetchFailure>,
    },
    DownloadAccepted {
        link: LinkRef,
        id: DownloadId,
    },
    DownloadRejected {
        link: LinkRef,
        error: String,
    },
}

/// Forwards dequeued processors to the session's event loop
struct QueueHandler {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl JobHandler for QueueHandler {
    fn handle(&mut self, processor: &Processor) {
        let _ = self.events.send(SessionEvent::Handle(processor.id));
    }
}

/// The services a session relies on
pub struct Collaborators {
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub extractor: Arc<dyn Extractor>,
    pub backend: Arc<dyn DownloadBackend>,
    pub deltas: mpsc::UnboundedReceiver<DownloadDelta>,
    pub view: Arc<dyn ViewSink>,
    pub preferences: watch::Receiver<Preferences>,
}

/// Settings fixed for the lifetime of a session
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub conflict_action: ConflictAction,
    pub save_as: bool,
    pub already_visited_cache: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            conflict_action: ConflictAction::Uniquify,
            save_as: false,
            already_visited_cache: true,
        }
    }
}

/// Main harvest session structure
pub struct Session {
    dictionary: Arc<Dictionary>,
    factory: ProcessorFactory,
    queue: ProcessingQueue,
    dispatcher: DownloadDispatcher,
    visited: VisitedCache,
    fetcher: Arc<dyn RemoteFetcher>,
    extractor: Arc<dyn Extractor>,
    backend: Arc<dyn DownloadBackend>,
    view: Arc<dyn ViewSink>,
    deltas: mpsc::UnboundedReceiver<DownloadDelta>,
    preferences: watch::Receiver<Preferences>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    options: SessionOptions,
    pending_fetches: usize,
    started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(dictionary: Arc<Dictionary>, collaborators: Collaborators, options: SessionOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut queue = ProcessingQueue::new();
        queue.register_handler(Box::new(QueueHandler {
            events: events_tx.clone(),
        }));

        Self {
            dictionary,
            factory: ProcessorFactory::new(),
            queue,
            dispatcher: DownloadDispatcher::new(collaborators.preferences.clone()),
            visited: VisitedCache::new(options.already_visited_cache),
            fetcher: collaborators.fetcher,
            extractor: collaborators.extractor,
            backend: collaborators.backend,
            view: collaborators.view,
            deltas: collaborators.deltas,
            preferences: collaborators.preferences,
            events_tx,
            events_rx,
            options,
            pending_fetches: 0,
            started_at: Utc::now(),
        }
    }

    /// Matches `page` against the dictionary and queues every processor found
    ///
    /// Returns the ids of the new processors.
    pub fn add_page(&mut self, page: &PageSource) -> Vec<ProcessorId> {
        let processors = self.factory.build(page, &self.dictionary.rules);
        tracing::info!("{} candidates found on {}", processors.len(), page.url);

        let mut ids = Vec::with_capacity(processors.len());
        for processor in processors {
            ids.push(processor.id);
            self.view.processor_updated(&ProcessorSnapshot::from(&processor));
            self.queue.append(processor);
        }
        ids
    }

    /// Runs the pipeline until it is idle
    ///
    /// The session is idle once no job can be dispatched (the queue is empty
    /// or paused), no fetch is outstanding and the dispatcher has neither
    /// running nor waiting downloads. `run` may be called again after more
    /// pages were added or processors were rescheduled.
    pub async fn run(&mut self) {
        tracing::info!("Starting harvest with {} queued processors", self.queue.len());
        self.queue.process_next_item();

        loop {
            while let Ok(event) = self.events_rx.try_recv() {
                self.on_event(event);
            }
            if self.is_idle() {
                break;
            }

            tokio::select! {
                Some(event) = self.events_rx.recv() => self.on_event(event),
                Some(delta) = self.deltas.recv() => self.on_download_changed(delta),
                Ok(()) = self.preferences.changed() => self.on_preferences_changed(),
                else => {
                    tracing::warn!("Every session channel closed, stopping");
                    break;
                }
            }
        }

        tracing::info!("Harvest idle: {} processors known", self.queue.history_len());
    }

    pub fn is_idle(&self) -> bool {
        (self.queue.is_empty() || self.queue.is_paused())
            && self.pending_fetches == 0
            && self.dispatcher.is_idle()
    }

    /// Resets a processor and queues it again
    pub fn reschedule(&mut self, id: ProcessorId) -> bool {
        let rescheduled = self.queue.reschedule(id);
        if rescheduled {
            self.notify(id);
        }
        rescheduled
    }

    pub fn remove(&mut self, id: ProcessorId) -> Option<Processor> {
        self.queue.remove(id)
    }

    /// Pauses or resumes discovery; running fetches and downloads continue
    pub fn toggle_pause(&mut self) -> bool {
        self.queue.toggle_paused_status()
    }

    pub fn processor(&self, id: ProcessorId) -> Option<&Processor> {
        self.queue.get(id)
    }

    pub fn processors(&self) -> Vec<&Processor> {
        self.queue.processors()
    }

    pub fn queue(&self) -> &ProcessingQueue {
        &self.queue
    }

    pub fn visited(&self) -> &VisitedCache {
        &self.visited
    }

    pub fn statistics(&self) -> SessionStatistics {
        SessionStatistics::collect(self.queue.processors(), self.started_at)
    }

    fn notify(&self, id: ProcessorId) {
        if let Some(processor) = self.queue.get(id) {
            self.view.processor_updated(&ProcessorSnapshot::from(processor));
        }
    }

    fn link_mut(&mut self, link: &LinkRef) -> Option<&mut DownloadLink> {
        self.queue
            .get_mut(link.processor_id)?
            .link_mut(&link.link_id)
    }

    fn on_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Handle(id) => self.handle_processor(id),
            SessionEvent::FetchDone {
                processor_id,
                attempt,
                result,
            } => {
                self.pending_fetches = self.pending_fetches.saturating_sub(1);
                self.on_fetch_done(processor_id, attempt, result);
            }
            SessionEvent::DownloadAccepted { link, id } => self.on_download_accepted(link, id),
            SessionEvent::DownloadRejected { link, error } => {
                self.on_download_rejected(link, error)
            }
        }
    }

    fn handle_processor(&mut self, id: ProcessorId) {
        let Some(processor) = self.queue.get_mut(id) else {
            tracing::warn!("Processor {} vanished before it was handled", id);
            self.queue.process_next_item();
            return;
        };

        let attempt = processor.attempt;
        match handler::begin(processor, self.extractor.as_ref()) {
            HandleStep::Resolved(found) => self.on_links_found(id, found),
            HandleStep::Fetch { url, force_xml } => {
                self.notify(id);
                self.pending_fetches += 1;

                let fetcher = Arc::clone(&self.fetcher);
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = fetcher.fetch(&url, force_xml).await;
                    let _ = events.send(SessionEvent::FetchDone {
                        processor_id: id,
                        attempt,
                        result,
                    });
                });
            }
            HandleStep::Unresolvable => {
                self.notify(id);
                self.queue.process_next_item();
            }
        }
    }

    fn on_fetch_done(
        &mut self,
        id: ProcessorId,
        attempt: u32,
        result: Result<FetchedDocument, FetchFailure>,
    ) {
        let current = self
            .queue
            .get_mut(id)
            .filter(|p| p.attempt == attempt && p.status == ProcessorStatus::RetrievingLinks);
        let Some(processor) = current else {
            tracing::debug!("Dropping stale fetch result for processor {}", id);
            self.queue.process_next_item();
            return;
        };

        match handler::on_fetch_result(processor, result, self.extractor.as_ref()) {
            Some(found) => {
                self.notify(id);
                self.on_links_found(id, found);
            }
            None => {
                self.notify(id);
                self.queue.process_next_item();
            }
        }
    }

    fn on_links_found(&mut self, id: ProcessorId, found: Vec<FoundLink>) {
        let Some(processor) = self.queue.get_mut(id) else {
            return;
        };
        let fresh = handler::apply_found_links(processor, found, &mut self.visited);

        let requests: Vec<DownloadRequest> = fresh
            .iter()
            .filter_map(|link_id| processor.link(link_id))
            .map(|link| DownloadRequest {
                link: LinkRef {
                    processor_id: id,
                    link_id: link.id.clone(),
                },
                options: DownloadOptions {
                    url: link.link.clone(),
                    conflict_action: self.options.conflict_action,
                    filename: link.file_name.clone(),
                    save_as: self.options.save_as,
                },
            })
            .collect();

        tracing::info!(
            "Processor {}: {} links, {} to download",
            id,
            processor.download_links.len(),
            requests.len()
        );
        self.notify(id);

        if requests.is_empty() {
            self.queue.process_next_item();
            return;
        }
        for request in requests {
            self.start_download(request);
        }
    }

    fn start_download(&mut self, request: DownloadRequest) {
        match self.dispatcher.start_download(request) {
            Dispatch::Launch(request) => self.launch(request),
            Dispatch::Deferred => {}
        }
    }

    /// Submits a request to the backend from a spawned task
    fn launch(&self, request: DownloadRequest) {
        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let DownloadRequest { link, options } = request;
            let event = match backend.download(options).await {
                Ok(id) => SessionEvent::DownloadAccepted { link, id },
                Err(e) => SessionEvent::DownloadRejected {
                    link,
                    error: e.to_string(),
                },
            };
            let _ = events.send(event);
        });
    }

    fn on_download_accepted(&mut self, link: LinkRef, id: DownloadId) {
        let completion = self.dispatcher.on_accepted(id, link.clone());

        if let Some(download) = self.link_mut(&link) {
            download.status = LinkStatus::Downloading;
            download.download_item_id = Some(id);
        }
        self.notify(link.processor_id);
        self.queue.process_next_item();

        if let Some(completion) = completion {
            self.on_completion(completion);
        }
    }

    fn on_download_rejected(&mut self, link: LinkRef, error: String) {
        tracing::warn!("Download of link {} rejected: {}", link.link_id, error);

        if let Some(next) = self.dispatcher.on_rejected() {
            self.launch(next);
        }
        if let Some(download) = self.link_mut(&link) {
            download.status = LinkStatus::Failure;
        }
        self.notify(link.processor_id);
        self.queue.process_next_item();
    }

    fn on_download_changed(&mut self, delta: DownloadDelta) {
        if let Some(completion) = self.dispatcher.on_download_changed(delta) {
            self.on_completion(completion);
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        let status = match completion.outcome {
            DownloadOutcome::Complete => LinkStatus::Success,
            DownloadOutcome::Interrupted(InterruptReason::InvalidMimeType) => {
                LinkStatus::InvalidMimeType
            }
            DownloadOutcome::Interrupted(InterruptReason::UnexpectedSmallSize) => {
                LinkStatus::UnexpectedSmallSize
            }
            DownloadOutcome::Interrupted(_) => LinkStatus::Failure,
        };

        if let Some(download) = self.link_mut(&completion.link) {
            download.status = status;
        }
        self.notify(completion.link.processor_id);

        if status == LinkStatus::Success && self.dispatcher.hide_successful_downloads() {
            let backend = Arc::clone(&self.backend);
            let id = completion.id;
            tokio::spawn(async move {
                if let Err(e) = backend.erase(id).await {
                    tracing::debug!("Cannot erase download {}: {}", id, e);
                }
            });
        }

        if let Some(next) = completion.next {
            self.launch(next);
        }
    }

    fn on_preferences_changed(&mut self) {
        let preferences = *self.preferences.borrow();
        tracing::info!(
            "Preferences changed: max {} parallel downloads, hide successful: {}",
            preferences.max_parallel_downloads,
            preferences.hide_successful_downloads
        );
        for request in self.dispatcher.on_preferences_changed() {
            self.launch(request);
        }
    }
}
