use serde::Deserialize;

/// Main configuration structure for linkhound
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub dictionary: DictionaryConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub downloads: DownloadsConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Extracts the hot-reloadable part of the configuration
    pub fn preferences(&self) -> Preferences {
        Preferences {
            max_parallel_downloads: self.downloads.max_parallel_downloads,
            hide_successful_downloads: self.downloads.hide_successful_downloads,
        }
    }
}

/// Location of the rule dictionary
#[derive(Debug, Clone, Deserialize)]
pub struct DictionaryConfig {
    /// Path to the XML dictionary document
    pub path: String,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the harvester
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the harvester
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the harvester
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for harvester-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Download behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadsConfig {
    /// Directory receiving downloaded files
    #[serde(rename = "output-directory")]
    pub output_directory: String,

    /// Maximum number of simultaneous downloads (<= 0 means unlimited)
    #[serde(rename = "max-parallel-downloads", default = "default_max_parallel")]
    pub max_parallel_downloads: i64,

    /// Erase finished downloads from the backend history
    #[serde(rename = "hide-successful-downloads", default)]
    pub hide_successful_downloads: bool,

    /// What to do when the target file already exists
    #[serde(rename = "conflict-action", default)]
    pub conflict_action: ConflictAction,

    /// Ask for a destination for every file (ignored by non-interactive backends)
    #[serde(rename = "save-as", default)]
    pub save_as: bool,

    /// Downloads smaller than this many bytes are flagged as suspicious
    #[serde(rename = "min-file-size", default)]
    pub min_file_size: u64,

    /// MIME type prefixes accepted for downloaded content (empty accepts all)
    #[serde(rename = "accepted-mime-types", default)]
    pub accepted_mime_types: Vec<String>,
}

/// Per-session toggles
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Skip links already seen during this session
    #[serde(rename = "already-visited-cache", default = "default_true")]
    pub already_visited_cache: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            already_visited_cache: true,
        }
    }
}

/// Behavior when a downloaded file name is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    /// Append " (n)" to the file stem until the name is free
    #[default]
    Uniquify,
    /// Replace the existing file
    Overwrite,
}

impl ConflictAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uniquify => "uniquify",
            Self::Overwrite => "overwrite",
        }
    }
}

/// Runtime preferences the download dispatcher re-reads on every decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preferences {
    /// Maximum simultaneous downloads; zero or negative means unlimited
    pub max_parallel_downloads: i64,

    /// Erase the backend's record of a download once it succeeded
    pub hide_successful_downloads: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            max_parallel_downloads: default_max_parallel(),
            hide_successful_downloads: false,
        }
    }
}

fn default_max_parallel() -> i64 {
    3
}

fn default_true() -> bool {
    true
}
