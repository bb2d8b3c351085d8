use crate::dictionary::{apply_interceptors, compile_url_patterns, domain_matches, HostRule};
use crate::processor::types::{Processor, ProcessorIdGenerator};
use crate::url::resolve_relative;
use std::collections::HashSet;

/// A page to match against the dictionary
#[derive(Debug, Clone)]
pub struct PageSource {
    pub url: String,
    pub markup: String,
    pub title: Option<String>,
}

/// Builds processors from a page and the dictionary's rules
#[derive(Debug, Default)]
pub struct ProcessorFactory {
    ids: ProcessorIdGenerator,
}

impl ProcessorFactory {
    pub fn new() -> Self {
        Self {
            ids: ProcessorIdGenerator::new(),
        }
    }

    /// Finds every candidate on `page` for every valid rule
    ///
    /// A rule whose path pattern is `{current}` matches the page itself and
    /// yields one processor carrying the page markup. Any other rule scans
    /// the markup for links of its domain and path; duplicates are dropped
    /// within the rule, so two rules may still produce the same link.
    pub fn build<'a>(
        &mut self,
        page: &PageSource,
        rules: impl IntoIterator<Item = &'a HostRule>,
    ) -> Vec<Processor> {
        let mut processors = Vec::new();

        for rule in rules.into_iter().filter(|rule| rule.is_valid()) {
            let (Some(domain), Some(path)) = (&rule.domain, &rule.path_pattern) else {
                continue;
            };

            if rule.targets_current_page() {
                if domain_matches(domain, &page.url) {
                    let mut processor = self.processor(rule, &page.url, page);
                    processor.document = Some(page.markup.clone());
                    processors.push(processor);
                }
                continue;
            }

            let mut seen = HashSet::new();
            for pattern in compile_url_patterns(&page.url, domain, path, &rule.id) {
                for caps in pattern.regex.captures_iter(&page.markup) {
                    let Some(raw) = caps.get(1).map(|m| m.as_str()) else {
                        continue;
                    };
                    if pattern.exclude_host && raw.contains("://") {
                        continue;
                    }
                    let absolute = match resolve_relative(raw, &page.url) {
                        Ok(absolute) => absolute,
                        Err(e) => {
                            tracing::debug!("Rule '{}': skipping '{}': {}", rule.id, raw, e);
                            continue;
                        }
                    };
                    let link = apply_interceptors(&rule.pre_path_interceptors, &absolute);
                    if seen.insert(link.clone()) {
                        processors.push(self.processor(rule, &link, page));
                    }
                }
            }
        }

        tracing::debug!("{} processors built for {}", processors.len(), page.url);
        processors
    }

    fn processor(&mut self, rule: &HostRule, matching_url: &str, page: &PageSource) -> Processor {
        Processor::from_rule(
            self.ids.next_id(),
            rule,
            matching_url,
            page.url.clone(),
            page.title.clone(),
        )
    }
}
