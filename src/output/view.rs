//! Processor snapshots and the sinks that display them

use crate::download::DownloadId;
use crate::processor::{DownloadLink, Processor, ProcessorId};
use crate::state::{LinkStatus, ProcessorStatus};
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;

/// What a view is allowed to know about a processor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorSnapshot {
    pub id: ProcessorId,
    pub status: ProcessorStatus,
    pub matching_url: String,
    pub download_links: Vec<LinkSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSnapshot {
    pub id: String,
    pub link: String,
    pub status: LinkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_item_id: Option<DownloadId>,
}

impl From<&DownloadLink> for LinkSnapshot {
    fn from(link: &DownloadLink) -> Self {
        Self {
            id: link.id.clone(),
            link: link.link.clone(),
            status: link.status,
            download_item_id: link.download_item_id,
        }
    }
}

impl From<&Processor> for ProcessorSnapshot {
    fn from(processor: &Processor) -> Self {
        Self {
            id: processor.id,
            status: processor.status,
            matching_url: processor.matching_url.clone(),
            download_links: processor.download_links.iter().map(LinkSnapshot::from).collect(),
        }
    }
}

/// Receives a snapshot on every processor lifecycle event
pub trait ViewSink: Send + Sync {
    fn processor_updated(&self, snapshot: &ProcessorSnapshot);
}

/// Reports processor events through `tracing`
#[derive(Debug, Default)]
pub struct LogView;

impl ViewSink for LogView {
    fn processor_updated(&self, snapshot: &ProcessorSnapshot) {
        let downloading = snapshot
            .download_links
            .iter()
            .filter(|l| l.status == LinkStatus::Downloading)
            .count();
        let done = snapshot
            .download_links
            .iter()
            .filter(|l| l.status.is_terminal())
            .count();
        tracing::info!(
            "[{}] {} {} ({} links, {} downloading, {} done)",
            snapshot.id,
            snapshot.status,
            snapshot.matching_url,
            snapshot.download_links.len(),
            downloading,
            done
        );
        for link in &snapshot.download_links {
            tracing::debug!("  {} {} {}", link.id, link.status, link.link);
        }
    }
}

/// Writes each snapshot as one JSON line
pub struct JsonLinesView<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesView<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ViewSink for JsonLinesView<W> {
    fn processor_updated(&self, snapshot: &ProcessorSnapshot) {
        let line = match serde_json::to_string(snapshot) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Cannot serialize snapshot {}: {}", snapshot.id, e);
                return;
            }
        };
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            tracing::error!("Cannot write snapshot {}: {}", snapshot.id, e);
        }
    }
}

/// Keeps every snapshot in memory
#[derive(Debug, Default)]
pub struct MemoryView {
    snapshots: Mutex<Vec<ProcessorSnapshot>>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<ProcessorSnapshot> {
        self.snapshots
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl ViewSink for MemoryView {
    fn processor_updated(&self, snapshot: &ProcessorSnapshot) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.push(snapshot.clone());
        }
    }
}
