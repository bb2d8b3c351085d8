/// Processor status definitions for tracking discovery progress
///
/// This module defines all possible states a processor can be in while its
/// download links are being discovered.
use serde::Serialize;
use std::fmt;

/// Represents the discovery state of a processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessorStatus {
    // ===== Active States =====
    /// Processor is queued and waiting to be handled
    Waiting,

    /// The target document is being fetched
    RetrievingLinks,

    /// The target document arrived, links are being extracted
    RetrievingLinksDone,

    // ===== Terminal States =====
    /// At least one download link was found
    GotLinks,

    /// The strategy ran but found nothing
    NoLinkFound,

    /// The target document could not be retrieved
    RetrievingLinksFailure,
}

impl ProcessorStatus {
    /// Returns true if discovery is over for this processor
    ///
    /// Only an explicit reschedule moves a terminal processor back to
    /// `Waiting`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::GotLinks | Self::NoLinkFound | Self::RetrievingLinksFailure
        )
    }

    /// Returns true if the processor is waiting for or undergoing discovery
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this represents a failed discovery
    pub fn is_error(&self) -> bool {
        matches!(self, Self::NoLinkFound | Self::RetrievingLinksFailure)
    }

    /// Wire name of the status, as seen by the view
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::RetrievingLinks => "RETRIEVING_LINKS",
            Self::RetrievingLinksDone => "RETRIEVING_LINKS_DONE",
            Self::GotLinks => "GOT_LINKS",
            Self::NoLinkFound => "NO_LINK_FOUND",
            Self::RetrievingLinksFailure => "RETRIEVING_LINKS_FAILURE",
        }
    }

    /// Parses a status from its wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WAITING" => Some(Self::Waiting),
            "RETRIEVING_LINKS" => Some(Self::RetrievingLinks),
            "RETRIEVING_LINKS_DONE" => Some(Self::RetrievingLinksDone),
            "GOT_LINKS" => Some(Self::GotLinks),
            "NO_LINK_FOUND" => Some(Self::NoLinkFound),
            "RETRIEVING_LINKS_FAILURE" => Some(Self::RetrievingLinksFailure),
            _ => None,
        }
    }

    /// Returns all possible processor states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Waiting,
            Self::RetrievingLinks,
            Self::RetrievingLinksDone,
            Self::GotLinks,
            Self::NoLinkFound,
            Self::RetrievingLinksFailure,
        ]
    }
}

impl fmt::Display for ProcessorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!ProcessorStatus::Waiting.is_terminal());
        assert!(!ProcessorStatus::RetrievingLinks.is_terminal());
        assert!(!ProcessorStatus::RetrievingLinksDone.is_terminal());

        assert!(ProcessorStatus::GotLinks.is_terminal());
        assert!(ProcessorStatus::NoLinkFound.is_terminal());
        assert!(ProcessorStatus::RetrievingLinksFailure.is_terminal());
    }

    #[test]
    fn test_is_error() {
        assert!(ProcessorStatus::NoLinkFound.is_error());
        assert!(ProcessorStatus::RetrievingLinksFailure.is_error());
        assert!(!ProcessorStatus::GotLinks.is_error());
        assert!(!ProcessorStatus::Waiting.is_error());
    }

    #[test]
    fn test_roundtrip_wire_name() {
        for state in ProcessorStatus::all_states() {
            assert_eq!(ProcessorStatus::parse(state.as_str()), Some(state));
        }
        assert_eq!(ProcessorStatus::parse("invalid"), None);
    }

    #[test]
    fn test_serialize_matches_wire_name() {
        for state in ProcessorStatus::all_states() {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }
}
