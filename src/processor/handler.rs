//! Processor handling
//!
//! Pure transitions of a processor through its discovery states. The
//! session performs the side effects each step asks for.

use crate::crawler::{FetchFailure, FetchedDocument};
use crate::dictionary::{apply_interceptors, SearchMethod};
use crate::extract::{Attributes, Extractor, FoundLink};
use crate::processor::types::Processor;
use crate::state::{LinkStatus, ProcessorStatus, VisitedCache};
use crate::url::resolve_relative;
use std::collections::HashSet;

/// What has to happen next for a processor being handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleStep {
    /// Links were found without any I/O
    Resolved(Vec<FoundLink>),
    /// The target page has to be fetched first
    Fetch { url: String, force_xml: bool },
    /// The processor has no usable strategy
    Unresolvable,
}

/// Path extensions whose documents are parsed as XML for XPath searches
const XML_EXTENSIONS: &[&str] = &[".xml", ".rss", ".atom"];

/// Whether fetching `url` for `method` has to produce well-formed XML
pub fn requires_xml(method: &SearchMethod, url: &str) -> bool {
    if !matches!(method, SearchMethod::XPath(_)) {
        return false;
    }
    let path = ::url::Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    XML_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn attributes(processor: &Processor) -> Attributes<'_> {
    Attributes {
        link: processor.link_attribute.as_deref(),
        file_name: processor.file_name_attribute.as_deref(),
    }
}

/// Starts handling a dequeued processor
///
/// A stored source document is consumed here whatever the outcome.
pub fn begin(processor: &mut Processor, extractor: &dyn Extractor) -> HandleStep {
    let document = processor.document.take();

    match &processor.search {
        SearchMethod::None => {
            tracing::warn!(
                "Processor {} has no usable search pattern (rule '{}')",
                processor.id,
                processor.rule_id
            );
            processor.status = ProcessorStatus::NoLinkFound;
            HandleStep::Unresolvable
        }
        SearchMethod::SelfLink | SearchMethod::Replace { .. } => HandleStep::Resolved(
            extractor.extract_from_url(&processor.search, &processor.matching_url),
        ),
        method => match document {
            Some(markup) => HandleStep::Resolved(extractor.extract_from_markup(
                method,
                &markup,
                attributes(processor),
            )),
            None => {
                processor.status = ProcessorStatus::RetrievingLinks;
                HandleStep::Fetch {
                    url: processor.matching_url.clone(),
                    force_xml: requires_xml(method, &processor.matching_url),
                }
            }
        },
    }
}

/// Applies the result of the fetch requested by [`begin`]
///
/// Returns the found links, or `None` when the fetch failed.
pub fn on_fetch_result(
    processor: &mut Processor,
    result: Result<FetchedDocument, FetchFailure>,
    extractor: &dyn Extractor,
) -> Option<Vec<FoundLink>> {
    match result {
        Ok(document) => {
            processor.status = ProcessorStatus::RetrievingLinksDone;
            Some(extractor.extract_from_markup(
                &processor.search,
                &document.body,
                attributes(processor),
            ))
        }
        Err(failure) => {
            tracing::warn!(
                "Retrieving links of {} failed: {}",
                processor.matching_url,
                failure
            );
            processor.status = ProcessorStatus::RetrievingLinksFailure;
            None
        }
    }
}

/// Turns found links into download links
///
/// Links are made absolute against the processor's URL and run through its
/// interceptors. Duplicates within the processor are dropped; links the
/// session already handed out are kept but marked `AlreadyDownloaded`.
/// Returns the ids of the links that still have to be downloaded.
pub fn apply_found_links(
    processor: &mut Processor,
    found: Vec<FoundLink>,
    visited: &mut VisitedCache,
) -> Vec<String> {
    let mut seen: HashSet<String> = processor
        .download_links
        .iter()
        .map(|l| l.link.clone())
        .collect();
    let mut fresh = Vec::new();

    for found in found {
        let absolute = match resolve_relative(&found.link, &processor.matching_url) {
            Ok(absolute) => absolute,
            Err(e) => {
                tracing::debug!("Dropping link '{}': {}", found.link, e);
                continue;
            }
        };
        let link = apply_interceptors(&processor.interceptors, &absolute);
        if !seen.insert(link.clone()) {
            continue;
        }

        let file_name = found
            .name
            .map(|name| apply_interceptors(&processor.file_name_interceptors, &name));
        let status = if visited.check_and_record(&link) {
            LinkStatus::AlreadyDownloaded
        } else {
            LinkStatus::Waiting
        };
        let id = processor.push_link(link, status, file_name);
        if status == LinkStatus::Waiting {
            fresh.push(id);
        }
    }

    processor.status = if processor.download_links.is_empty() {
        ProcessorStatus::NoLinkFound
    } else {
        ProcessorStatus::GotLinks
    };
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{DomainSpec, HostRule, Interceptor};
    use crate::extract::DefaultExtractor;

    fn processor(search: &str, url: &str) -> Processor {
        let mut rule = HostRule::new("r");
        rule.domain = Some(DomainSpec::Literal("a.com".to_string()));
        rule.path_pattern = Some("x".to_string());
        rule.search = SearchMethod::classify(search);
        Processor::from_rule(1, &rule, url, "http://a.com/", None)
    }

    #[test]
    fn test_self_resolves_without_fetch() {
        let mut p = processor("self", "http://a.com/x.jpg");
        assert_eq!(
            begin(&mut p, &DefaultExtractor),
            HandleStep::Resolved(vec![FoundLink::new("http://a.com/x.jpg")])
        );
    }

    #[test]
    fn test_document_strategy_fetches() {
        let mut p = processor("class: big", "http://a.com/page.html");
        assert_eq!(
            begin(&mut p, &DefaultExtractor),
            HandleStep::Fetch {
                url: "http://a.com/page.html".to_string(),
                force_xml: false
            }
        );
        assert_eq!(p.status, ProcessorStatus::RetrievingLinks);
    }

    #[test]
    fn test_xpath_on_feed_forces_xml() {
        let mut p = processor("xpath: //enclosure/@url", "http://a.com/feed.RSS?page=2");
        assert!(matches!(
            begin(&mut p, &DefaultExtractor),
            HandleStep::Fetch { force_xml: true, .. }
        ));
        assert!(!requires_xml(&SearchMethod::classify("class: x"), "http://a.com/feed.xml"));
    }

    #[test]
    fn test_stored_document_used_once() {
        let mut p = processor("class: big", "http://a.com/page.html");
        p.document = Some(r#"<img class="big" src="/1.jpg">"#.to_string());

        assert_eq!(
            begin(&mut p, &DefaultExtractor),
            HandleStep::Resolved(vec![FoundLink::new("/1.jpg")])
        );
        assert!(p.document.is_none());
        assert!(matches!(begin(&mut p, &DefaultExtractor), HandleStep::Fetch { .. }));
    }

    #[test]
    fn test_unresolvable() {
        let mut p = processor("nonsense", "http://a.com/");
        assert_eq!(begin(&mut p, &DefaultExtractor), HandleStep::Unresolvable);
        assert_eq!(p.status, ProcessorStatus::NoLinkFound);
    }

    #[test]
    fn test_fetch_failure() {
        let mut p = processor("class: big", "http://a.com/page.html");
        begin(&mut p, &DefaultExtractor);
        let result = on_fetch_result(&mut p, Err(FetchFailure::transport("down")), &DefaultExtractor);
        assert!(result.is_none());
        assert_eq!(p.status, ProcessorStatus::RetrievingLinksFailure);
    }

    #[test]
    fn test_fetch_success_extracts() {
        let mut p = processor("class: big", "http://a.com/page.html");
        begin(&mut p, &DefaultExtractor);
        let document = FetchedDocument {
            url: "http://a.com/page.html".to_string(),
            status: 200,
            content_type: Some("text/html".to_string()),
            body: r#"<a class="big" href="full.jpg">x</a>"#.to_string(),
        };
        let found = on_fetch_result(&mut p, Ok(document), &DefaultExtractor).unwrap();
        assert_eq!(p.status, ProcessorStatus::RetrievingLinksDone);
        assert_eq!(found, vec![FoundLink::new("full.jpg")]);
    }

    #[test]
    fn test_found_links_outcome() {
        let mut p = processor("class: big", "http://a.com/gallery/page.html");
        p.interceptors = vec![Interceptor::new("_thumb", "").unwrap()];
        p.file_name_interceptors = vec![Interceptor::new(" ", "_").unwrap()];
        let mut visited = VisitedCache::new(true);
        visited.check_and_record("http://a.com/gallery/seen.jpg");

        let found = vec![
            FoundLink {
                link: "a_thumb.jpg".to_string(),
                name: Some("my cat".to_string()),
            },
            FoundLink::new("/gallery/a.jpg"),
            FoundLink::new("seen.jpg"),
            FoundLink::new("http://cdn.com/b.jpg"),
        ];
        let fresh = apply_found_links(&mut p, found, &mut visited);

        assert_eq!(p.status, ProcessorStatus::GotLinks);
        let links: Vec<_> = p
            .download_links
            .iter()
            .map(|l| (l.id.as_str(), l.link.as_str(), l.status))
            .collect();
        assert_eq!(
            links,
            vec![
                ("1-0", "http://a.com/gallery/a.jpg", LinkStatus::Waiting),
                ("1-1", "http://a.com/gallery/seen.jpg", LinkStatus::AlreadyDownloaded),
                ("1-2", "http://cdn.com/b.jpg", LinkStatus::Waiting),
            ]
        );
        assert_eq!(p.download_links[0].file_name.as_deref(), Some("my_cat"));
        assert_eq!(fresh, vec!["1-0", "1-2"]);
    }

    #[test]
    fn test_no_links_found() {
        let mut p = processor("class: big", "http://a.com/page.html");
        let fresh = apply_found_links(&mut p, Vec::new(), &mut VisitedCache::new(true));
        assert!(fresh.is_empty());
        assert_eq!(p.status, ProcessorStatus::NoLinkFound);
    }

    #[test]
    fn test_disabled_cache_never_marks_repeats() {
        let mut visited = VisitedCache::new(false);
        let mut first = processor("self", "http://a.com/x.jpg");
        let mut second = processor("self", "http://a.com/x.jpg");
        let found = vec![FoundLink::new("http://a.com/x.jpg")];

        assert_eq!(apply_found_links(&mut first, found.clone(), &mut visited).len(), 1);
        assert_eq!(apply_found_links(&mut second, found, &mut visited).len(), 1);
    }
}
