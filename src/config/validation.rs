use crate::config::types::{Config, DictionaryConfig, DownloadsConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_dictionary_config(&config.dictionary)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_downloads_config(&config.downloads)?;
    Ok(())
}

fn validate_dictionary_config(config: &DictionaryConfig) -> Result<(), ConfigError> {
    if config.path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "dictionary path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates download configuration
fn validate_downloads_config(config: &DownloadsConfig) -> Result<(), ConfigError> {
    if config.output_directory.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output_directory cannot be empty".to_string(),
        ));
    }

    // <= 0 is the documented "unlimited" value, only absurd limits are rejected
    if config.max_parallel_downloads > 1000 {
        return Err(ConfigError::Validation(format!(
            "max_parallel_downloads must be <= 1000, got {}",
            config.max_parallel_downloads
        )));
    }

    for mime in &config.accepted_mime_types {
        if mime.trim().is_empty() {
            return Err(ConfigError::Validation(
                "accepted_mime_types cannot contain empty entries".to_string(),
            ));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConflictAction;

    fn downloads() -> DownloadsConfig {
        DownloadsConfig {
            output_directory: "./downloads".to_string(),
            max_parallel_downloads: 3,
            hide_successful_downloads: false,
            conflict_action: ConflictAction::Uniquify,
            save_as: false,
            min_file_size: 0,
            accepted_mime_types: vec![],
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_unlimited_parallel_downloads_accepted() {
        let mut config = downloads();
        config.max_parallel_downloads = 0;
        assert!(validate_downloads_config(&config).is_ok());
        config.max_parallel_downloads = -1;
        assert!(validate_downloads_config(&config).is_ok());
    }

    #[test]
    fn test_excessive_parallel_downloads_rejected() {
        let mut config = downloads();
        config.max_parallel_downloads = 5000;
        assert!(validate_downloads_config(&config).is_err());
    }

    #[test]
    fn test_empty_output_directory_rejected() {
        let mut config = downloads();
        config.output_directory = "  ".to_string();
        assert!(validate_downloads_config(&config).is_err());
    }

    #[test]
    fn test_empty_mime_entry_rejected() {
        let mut config = downloads();
        config.accepted_mime_types = vec!["image/".to_string(), "".to_string()];
        assert!(validate_downloads_config(&config).is_err());
    }
}
