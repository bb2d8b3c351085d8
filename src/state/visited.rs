use crate::url::cache_key;
use std::collections::HashSet;

/// Session-wide set of links that were already handed to the downloader
///
/// Append-only for the lifetime of a session. When disabled, every link is
/// reported as new and nothing is recorded.
#[derive(Debug, Clone)]
pub struct VisitedCache {
    enabled: bool,
    seen: HashSet<String>,
}

impl VisitedCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            seen: HashSet::new(),
        }
    }

    /// Records `link` and reports whether it had been seen before
    ///
    /// Returns `true` when the link is a repeat; the caller then marks it
    /// `AlreadyDownloaded` instead of queueing a download.
    pub fn check_and_record(&mut self, link: &str) -> bool {
        if !self.enabled {
            return false;
        }
        !self.seen.insert(cache_key(link))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for VisitedCache {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_check_is_repeat() {
        let mut cache = VisitedCache::new(true);
        assert!(!cache.check_and_record("https://example.com/a.jpg"));
        assert!(cache.check_and_record("https://example.com/a.jpg"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_fragment_does_not_make_a_new_link() {
        let mut cache = VisitedCache::new(true);
        assert!(!cache.check_and_record("https://example.com/a.jpg"));
        assert!(cache.check_and_record("https://EXAMPLE.com/a.jpg#zoom"));
    }

    #[test]
    fn test_disabled_never_reports_repeat() {
        let mut cache = VisitedCache::new(false);
        assert!(!cache.check_and_record("https://example.com/a.jpg"));
        assert!(!cache.check_and_record("https://example.com/a.jpg"));
        assert!(cache.is_empty());
    }
}
