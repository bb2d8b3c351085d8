//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `ProcessorStatus`: discovery state of a processor
//! - `LinkStatus`: download state of a single download link
//! - `VisitedCache`: session-wide set of links already handed to the downloader

mod link_status;
mod processor_status;
mod visited;

pub use link_status::LinkStatus;
pub use processor_status::ProcessorStatus;
pub use visited::VisitedCache;
