//! linkhound: a rule-driven media link harvester
//!
//! This crate matches web pages against a dictionary of host rules, turns every
//! match into a discovery job (a [`processor::Processor`]), resolves each job into
//! download links with one of seven extraction strategies, and downloads the
//! links under a bounded-concurrency dispatcher.

pub mod config;
pub mod crawler;
pub mod dictionary;
pub mod download;
pub mod extract;
pub mod output;
pub mod processor;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for linkhound operations
#[derive(Debug, Error)]
pub enum LinkhoundError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dictionary error: {0}")]
    Dictionary(#[from] DictionaryLoadError),

    #[error("Failed to fetch page {url}: {status} {status_text}")]
    PageFetch {
        url: String,
        status: u16,
        status_text: String,
    },

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors that prevent a dictionary document from being read at all
///
/// Rule-level problems are never reported here: they are accumulated as
/// [`dictionary::DictionaryError`] values on the loaded dictionary.
#[derive(Debug, Error)]
pub enum DictionaryLoadError {
    #[error("Failed to read dictionary file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dictionary is not well-formed XML: {0}")]
    Xml(#[from] roxmltree::Error),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),
}

/// Result type alias for linkhound operations
pub type Result<T> = std::result::Result<T, LinkhoundError>;

// Re-export commonly used types
pub use config::{Config, Preferences};
pub use crawler::{ProcessingQueue, Session};
pub use dictionary::{load_dictionary, parse_dictionary, Dictionary, HostRule};
pub use download::DownloadDispatcher;
pub use processor::{DownloadLink, Processor};
pub use state::{LinkStatus, ProcessorStatus, VisitedCache};
pub use crate::url::resolve_relative;
