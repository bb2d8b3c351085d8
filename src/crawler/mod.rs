//! Crawler module for page fetching and the harvest pipeline
//!
//! This module contains the core harvesting logic, including:
//! - Remote document fetching for processors whose target must be loaded
//! - Page parsing into a [`crate::processor::PageSource`]
//! - The processing queue of discovery jobs
//! - The session that drives discovery and downloads

mod coordinator;
mod fetcher;
mod parser;
mod scheduler;

pub use coordinator::{Collaborators, Session, SessionEvent, SessionOptions};
pub use fetcher::{
    build_http_client, FetchFailure, FetchedDocument, HttpFetcher, RemoteFetcher, INVALID_XML,
};
pub use parser::{fetch_page, parse_page};
pub use scheduler::{JobHandler, ProcessingQueue};
