//! Processing queue for discovery jobs
//!
//! A FIFO of processor ids plus a history map owning every processor ever
//! appended. A processor stays in the history after it is dequeued, so it
//! can be rescheduled until it is explicitly removed.

use crate::processor::{Processor, ProcessorId};
use std::collections::{HashMap, VecDeque};

/// Receives each dequeued processor
///
/// The handler is expected to call [`ProcessingQueue::process_next_item`]
/// again once it is done with the job, which keeps the queue draining one
/// job at a time.
pub trait JobHandler: Send {
    fn handle(&mut self, processor: &Processor);
}

/// FIFO queue of processors with pause, reschedule and removal
#[derive(Default)]
pub struct ProcessingQueue {
    active: VecDeque<ProcessorId>,
    history: HashMap<ProcessorId, Processor>,
    paused: bool,
    handler: Option<Box<dyn JobHandler>>,
}

impl ProcessingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_handler(&mut self, handler: Box<dyn JobHandler>) {
        self.handler = Some(handler);
    }

    /// Adds `processor` at the tail, replacing any history entry with its id
    pub fn append(&mut self, processor: Processor) {
        let id = processor.id;
        self.history.insert(id, processor);
        if !self.active.contains(&id) {
            self.active.push_back(id);
        }
    }

    /// Forgets a processor; unknown ids are ignored
    pub fn remove(&mut self, id: ProcessorId) -> Option<Processor> {
        self.active.retain(|queued| *queued != id);
        self.history.remove(&id)
    }

    /// Resets a known processor and queues it again
    ///
    /// Returns `false` when the id is unknown; nothing is processed then.
    pub fn reschedule(&mut self, id: ProcessorId) -> bool {
        let Some(processor) = self.history.get_mut(&id) else {
            tracing::warn!("Cannot reschedule processor {}: unknown id", id);
            return false;
        };
        processor.reset();
        if !self.active.contains(&id) {
            self.active.push_back(id);
        }
        self.process_next_item();
        true
    }

    /// Hands the head of the queue to the handler
    ///
    /// Returns whether a job was dispatched. Does nothing while paused or
    /// when the queue is empty.
    pub fn process_next_item(&mut self) -> bool {
        if self.paused {
            return false;
        }
        if self.handler.is_none() {
            tracing::warn!("No handler registered, leaving {} jobs queued", self.active.len());
            return false;
        }
        while let Some(id) = self.active.pop_front() {
            let (Some(processor), Some(handler)) = (self.history.get(&id), self.handler.as_mut())
            else {
                continue;
            };
            tracing::debug!("Processing {} ({})", processor.id, processor.matching_url);
            handler.handle(processor);
            return true;
        }
        false
    }

    /// Flips the pause flag and returns the new value
    ///
    /// Resuming immediately dispatches one job.
    pub fn toggle_paused_status(&mut self) -> bool {
        self.paused = !self.paused;
        if !self.paused {
            self.process_next_item();
        }
        self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn get(&self, id: ProcessorId) -> Option<&Processor> {
        self.history.get(&id)
    }

    pub fn get_mut(&mut self, id: ProcessorId) -> Option<&mut Processor> {
        self.history.get_mut(&id)
    }

    /// Jobs waiting to be dispatched
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Every processor known to the queue, in id order
    pub fn processors(&self) -> Vec<&Processor> {
        let mut processors: Vec<_> = self.history.values().collect();
        processors.sort_by_key(|p| p.id);
        processors
    }
}

impl std::fmt::Debug for ProcessingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingQueue")
            .field("active", &self.active)
            .field("history", &self.history.len())
            .field("paused", &self.paused)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
