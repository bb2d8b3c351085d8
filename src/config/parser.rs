use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use linkhound::config::load_config;
///
/// let config = load_config(Path::new("linkhound.toml")).unwrap();
/// println!("Parallel downloads: {}", config.downloads.max_parallel_downloads);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes the SHA-256 hash of the configuration file content
///
/// The CLI polls this hash to notice edits and push fresh preferences to a
/// running session.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read(path)?;
    Ok(content_hash(&content))
}

/// Loads a configuration and the hash of the exact content it was parsed from
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, content_hash(content.as_bytes())))
}

fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}
