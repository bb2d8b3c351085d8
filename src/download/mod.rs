//! Downloads: the bounded-concurrency dispatcher and the backend doing the transfers

mod backend;
mod dispatcher;

pub use backend::{
    BackendError, DownloadBackend, DownloadDelta, DownloadId, DownloadOptions, DownloadRecord,
    DownloadSettings, DownloadState, HttpDownloadBackend, InterruptReason,
};
pub use dispatcher::{
    Completion, Dispatch, DownloadDispatcher, DownloadOutcome, DownloadRequest, LinkRef,
};
