//! Configuration module for linkhound
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and exposes the hot-reloadable [`Preferences`] subset consumed by the download
//! dispatcher.
//!
//! # Example
//!
//! ```no_run
//! use linkhound::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("linkhound.toml")).unwrap();
//! println!("Dictionary: {}", config.dictionary.path);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, ConflictAction, DictionaryConfig, DownloadsConfig, Preferences, SessionConfig,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
