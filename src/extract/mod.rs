//! Link extraction strategies
//!
//! Runs a classified [`SearchMethod`] against a URL or against page markup
//! and returns the links it designates, in document order and without
//! duplicates.

pub mod xpath;

use crate::dictionary::{unescape_entities, Interceptor, SearchMethod};
use regex::RegexBuilder;
use scraper::{Html, Selector};
use std::collections::HashSet;

/// A link found by an extraction strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundLink {
    pub link: String,
    /// File name read from the rule's file name attribute
    pub name: Option<String>,
}

impl FoundLink {
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            name: None,
        }
    }
}

/// Attributes consulted by the element-based strategies
#[derive(Debug, Clone, Copy, Default)]
pub struct Attributes<'a> {
    /// Attribute holding the link; `src` then `href` when absent
    pub link: Option<&'a str>,
    pub file_name: Option<&'a str>,
}

/// Executes extraction strategies
///
/// Implemented by [`DefaultExtractor`]; tests substitute their own.
pub trait Extractor: Send + Sync {
    /// Strategies that work on the URL alone (`self`, `replace`)
    fn extract_from_url(&self, method: &SearchMethod, url: &str) -> Vec<FoundLink>;

    /// Strategies that need the target page's markup
    fn extract_from_markup(
        &self,
        method: &SearchMethod,
        markup: &str,
        attributes: Attributes<'_>,
    ) -> Vec<FoundLink>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExtractor;

impl Extractor for DefaultExtractor {
    fn extract_from_url(&self, method: &SearchMethod, url: &str) -> Vec<FoundLink> {
        match method {
            SearchMethod::SelfLink => vec![FoundLink::new(url)],
            SearchMethod::Replace { find, by } => match Interceptor::new(find, by) {
                Ok(replace) => vec![FoundLink::new(replace.apply(url))],
                Err(e) => {
                    tracing::warn!("Replace pattern '{}' does not compile: {}", find, e);
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }

    fn extract_from_markup(
        &self,
        method: &SearchMethod,
        markup: &str,
        attributes: Attributes<'_>,
    ) -> Vec<FoundLink> {
        let found = match method {
            SearchMethod::Id(name) => {
                select_elements(markup, &format!("[id=\"{}\"]", css_escape(name)), attributes)
            }
            SearchMethod::Class(name) => {
                select_elements(markup, &format!("[class~=\"{}\"]", css_escape(name)), attributes)
            }
            SearchMethod::CssQuery(selector) => select_elements(markup, selector, attributes),
            SearchMethod::XPath(expression) => {
                match xpath::evaluate(expression, markup, attributes) {
                    Ok(found) => found,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        Vec::new()
                    }
                }
            }
            SearchMethod::Expreg(source) => match_expression(markup, source),
            _ => Vec::new(),
        };
        dedup_links(found)
    }
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn select_elements(markup: &str, selector: &str, attributes: Attributes<'_>) -> Vec<FoundLink> {
    let selector = match Selector::parse(selector) {
        Ok(selector) => selector,
        Err(e) => {
            tracing::warn!("Invalid selector '{}': {:?}", selector, e);
            return Vec::new();
        }
    };

    let document = Html::parse_document(markup);
    document
        .select(&selector)
        .filter_map(|element| {
            let value = element.value();
            let link = match attributes.link {
                Some(name) => value.attr(name),
                None => value.attr("src").or_else(|| value.attr("href")),
            }?
            .trim();
            if link.is_empty() {
                return None;
            }
            let name = attributes
                .file_name
                .and_then(|name| value.attr(name))
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string);
            Some(FoundLink {
                link: link.to_string(),
                name,
            })
        })
        .collect()
}

fn match_expression(markup: &str, source: &str) -> Vec<FoundLink> {
    let regex = match RegexBuilder::new(&unescape_entities(source))
        .case_insensitive(true)
        .build()
    {
        Ok(regex) => regex,
        Err(e) => {
            tracing::warn!("Expreg pattern '{}' does not compile: {}", source, e);
            return Vec::new();
        }
    };

    // With capture groups the first one is the link, even when it is empty
    let group = usize::from(regex.captures_len() > 1);
    regex
        .captures_iter(markup)
        .filter_map(|caps| caps.get(group))
        .map(|m| m.as_str().trim())
        .filter(|link| !link.is_empty())
        .map(FoundLink::new)
        .collect()
}

fn dedup_links(found: Vec<FoundLink>) -> Vec<FoundLink> {
    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|found| seen.insert(found.link.clone()))
        .collect()
}
