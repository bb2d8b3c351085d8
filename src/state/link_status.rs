use serde::Serialize;
use std::fmt;

/// Represents the download state of a single link
///
/// `Waiting → Downloading → {Success | Failure}` is the live path.
/// `AlreadyDownloaded` is assigned at discovery time and never changes;
/// `InvalidMimeType` and `UnexpectedSmallSize` replace `Success` when the
/// downloaded content fails verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    Waiting,
    Downloading,
    Success,
    Failure,
    AlreadyDownloaded,
    InvalidMimeType,
    UnexpectedSmallSize,
}

impl LinkStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Waiting | Self::Downloading)
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::Failure | Self::InvalidMimeType | Self::UnexpectedSmallSize
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Downloading => "DOWNLOADING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::AlreadyDownloaded => "ALREADY_DOWNLOADED",
            Self::InvalidMimeType => "INVALID_MIME_TYPE",
            Self::UnexpectedSmallSize => "UNEXPECTED_SMALL_SIZE",
        }
    }

    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Waiting,
            Self::Downloading,
            Self::Success,
            Self::Failure,
            Self::AlreadyDownloaded,
            Self::InvalidMimeType,
            Self::UnexpectedSmallSize,
        ]
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
