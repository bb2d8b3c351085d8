//! Processors: discovery jobs built from dictionary matches
//!
//! - `factory`: matches a page against the rules and builds processors
//! - `handler`: the discovery state transitions of a processor
//! - `types`: processors and their download links

mod factory;
pub mod handler;
mod types;

pub use factory::{PageSource, ProcessorFactory};
pub use handler::HandleStep;
pub use types::{DownloadLink, Processor, ProcessorId, ProcessorIdGenerator};
