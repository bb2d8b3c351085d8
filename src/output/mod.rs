//! Output module for reporting harvest progress and results
//!
//! - `view`: per-processor snapshots and the sinks receiving them
//! - `stats`: end-of-session statistics

pub mod stats;
mod view;

pub use stats::{print_statistics, SessionStatistics};
pub use view::{JsonLinesView, LinkSnapshot, LogView, MemoryView, ProcessorSnapshot, ViewSink};
