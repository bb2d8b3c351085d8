//! Download backend
//!
//! The backend performs the real transfers. It accepts or rejects a
//! download right away and reports progress later as [`DownloadDelta`]s on
//! a channel, keyed by the [`DownloadId`] it handed out.

use crate::config::{ConflictAction, DownloadsConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Opaque identifier of an accepted download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DownloadId(pub u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to download and how to store it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub url: String,
    pub conflict_action: ConflictAction,
    /// Suggested file name; derived from the URL when absent
    pub filename: Option<String>,
    pub save_as: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    Network,
    Server,
    File,
    InvalidMimeType,
    UnexpectedSmallSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    InProgress,
    Complete,
    Interrupted(InterruptReason),
}

/// A change in a download's state; `state` is `None` for unrelated changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadDelta {
    pub id: DownloadId,
    pub state: Option<DownloadState>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid download URL '{0}'")]
    InvalidUrl(String),

    #[error("cannot prepare download target: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown download {0}")]
    UnknownDownload(DownloadId),
}

/// Performs downloads on behalf of the dispatcher
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Starts a download, returning its id once accepted
    async fn download(&self, options: DownloadOptions) -> Result<DownloadId, BackendError>;

    /// Removes a finished download from the backend's history
    async fn erase(&self, id: DownloadId) -> Result<(), BackendError>;
}

/// Verification and placement settings for [`HttpDownloadBackend`]
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub output_directory: PathBuf,
    /// Smaller completed files are deleted and reported as interrupted
    pub min_file_size: u64,
    /// Accepted `Content-Type` prefixes; empty accepts everything
    pub accepted_mime_types: Vec<String>,
}

impl From<&DownloadsConfig> for DownloadSettings {
    fn from(config: &DownloadsConfig) -> Self {
        Self {
            output_directory: PathBuf::from(&config.output_directory),
            min_file_size: config.min_file_size,
            accepted_mime_types: config.accepted_mime_types.clone(),
        }
    }
}

/// A download known to the backend
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    pub url: String,
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: DownloadState,
    pub bytes: u64,
}

struct Inner {
    client: Client,
    settings: DownloadSettings,
    next_id: AtomicU64,
    records: Mutex<HashMap<DownloadId, DownloadRecord>>,
    deltas: mpsc::UnboundedSender<DownloadDelta>,
}

/// [`DownloadBackend`] writing files into a directory over HTTP
#[derive(Clone)]
pub struct HttpDownloadBackend {
    inner: Arc<Inner>,
}

impl HttpDownloadBackend {
    /// Creates the backend and the receiver of its download deltas
    pub fn new(
        client: Client,
        settings: DownloadSettings,
    ) -> (Self, mpsc::UnboundedReceiver<DownloadDelta>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = Self {
            inner: Arc::new(Inner {
                client,
                settings,
                next_id: AtomicU64::new(1),
                records: Mutex::new(HashMap::new()),
                deltas: tx,
            }),
        };
        (backend, rx)
    }

    pub fn record(&self, id: DownloadId) -> Option<DownloadRecord> {
        self.inner.records.lock().ok()?.get(&id).cloned()
    }

    pub fn records(&self) -> Vec<(DownloadId, DownloadRecord)> {
        let Ok(records) = self.inner.records.lock() else {
            return Vec::new();
        };
        let mut records: Vec<_> = records.iter().map(|(id, r)| (*id, r.clone())).collect();
        records.sort_by_key(|(id, _)| *id);
        records
    }
}

#[async_trait]
impl DownloadBackend for HttpDownloadBackend {
    async fn download(&self, options: DownloadOptions) -> Result<DownloadId, BackendError> {
        let url = url::Url::parse(&options.url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| BackendError::InvalidUrl(options.url.clone()))?;

        if options.save_as {
            tracing::debug!("Save-as requested for {}, saving to the output directory", url);
        }

        tokio::fs::create_dir_all(&self.inner.settings.output_directory).await?;
        let name = options
            .filename
            .as_deref()
            .map(sanitize_file_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| file_name_from_url(&url));
        let (path, file) = open_target(
            &self.inner.settings.output_directory,
            &name,
            options.conflict_action,
        )
        .await?;

        let id = DownloadId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut records) = self.inner.records.lock() {
            records.insert(
                id,
                DownloadRecord {
                    url: options.url.clone(),
                    path: path.clone(),
                    started_at: Utc::now(),
                    finished_at: None,
                    state: DownloadState::InProgress,
                    bytes: 0,
                },
            );
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let (state, bytes) = transfer(&inner, url, &path, file).await;
            if let Ok(mut records) = inner.records.lock() {
                if let Some(record) = records.get_mut(&id) {
                    record.state = state;
                    record.bytes = bytes;
                    record.finished_at = Some(Utc::now());
                }
            }
            let _ = inner.deltas.send(DownloadDelta {
                id,
                state: Some(state),
            });
        });

        Ok(id)
    }

    async fn erase(&self, id: DownloadId) -> Result<(), BackendError> {
        let mut records = self
            .inner
            .records
            .lock()
            .map_err(|_| BackendError::UnknownDownload(id))?;
        records
            .remove(&id)
            .map(|_| ())
            .ok_or(BackendError::UnknownDownload(id))
    }
}

async fn transfer(inner: &Inner, url: url::Url, path: &Path, mut file: File) -> (DownloadState, u64) {
    let interrupted = |reason| DownloadState::Interrupted(reason);

    let mut response = match inner.client.get(url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Download of {} failed: {}", url, e);
            discard(path).await;
            return (interrupted(InterruptReason::Network), 0);
        }
    };

    if !response.status().is_success() {
        tracing::warn!("Download of {} failed: HTTP {}", url, response.status());
        discard(path).await;
        return (interrupted(InterruptReason::Server), 0);
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    if !mime_type_accepted(&inner.settings.accepted_mime_types, &content_type) {
        tracing::info!("Rejecting {}: content type '{}'", url, content_type);
        discard(path).await;
        return (interrupted(InterruptReason::InvalidMimeType), 0);
    }

    let mut bytes = 0u64;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                if let Err(e) = file.write_all(&chunk).await {
                    tracing::warn!("Cannot write {}: {}", path.display(), e);
                    discard(path).await;
                    return (interrupted(InterruptReason::File), bytes);
                }
                bytes += chunk.len() as u64;
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Download of {} interrupted: {}", url, e);
                discard(path).await;
                return (interrupted(InterruptReason::Network), bytes);
            }
        }
    }

    if let Err(e) = file.flush().await {
        tracing::warn!("Cannot flush {}: {}", path.display(), e);
        discard(path).await;
        return (interrupted(InterruptReason::File), bytes);
    }

    if bytes < inner.settings.min_file_size {
        tracing::info!(
            "Rejecting {}: {} bytes is below the minimum of {}",
            url,
            bytes,
            inner.settings.min_file_size
        );
        discard(path).await;
        return (interrupted(InterruptReason::UnexpectedSmallSize), bytes);
    }

    tracing::debug!("Saved {} ({} bytes) to {}", url, bytes, path.display());
    (DownloadState::Complete, bytes)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!("Cannot remove {}: {}", path.display(), e);
    }
}

fn mime_type_accepted(accepted: &[String], content_type: &str) -> bool {
    if accepted.is_empty() || content_type.is_empty() {
        return true;
    }
    accepted
        .iter()
        .any(|prefix| content_type.starts_with(&prefix.to_ascii_lowercase()))
}

/// Opens the file a download is written to
///
/// `Uniquify` never touches an existing file: it appends ` (n)` before the
/// extension until a free name is found.
async fn open_target(
    directory: &Path,
    name: &str,
    conflict_action: ConflictAction,
) -> std::io::Result<(PathBuf, File)> {
    match conflict_action {
        ConflictAction::Overwrite => {
            let path = directory.join(name);
            let file = File::create(&path).await?;
            Ok((path, file))
        }
        ConflictAction::Uniquify => {
            let (stem, extension) = split_extension(name);
            let mut attempt = 0u32;
            loop {
                let candidate = if attempt == 0 {
                    name.to_string()
                } else {
                    format!("{} ({}){}", stem, attempt, extension)
                };
                let path = directory.join(&candidate);
                match OpenOptions::new().write(true).create_new(true).open(&path).await {
                    Ok(file) => return Ok((path, file)),
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                    Err(e) => return Err(e),
                }
            }
        }
    }
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}

fn sanitize_file_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

fn file_name_from_url(url: &url::Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(sanitize_file_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download".to_string())
}
