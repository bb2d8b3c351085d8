//! Source page loading
//!
//! Turns a fetched page into the [`PageSource`] matched against the
//! dictionary.

use crate::crawler::fetcher::RemoteFetcher;
use crate::processor::PageSource;
use crate::{LinkhoundError, Result};
use scraper::{Html, Selector};

/// Builds a [`PageSource`], reading the page title from its markup
///
/// # Example
///
/// ```
/// use linkhound::crawler::parse_page;
///
/// let html = r#"<html><head><title>Test</title></head><body></body></html>"#;
/// let page = parse_page("https://example.com/", html);
/// assert_eq!(page.title, Some("Test".to_string()));
/// ```
pub fn parse_page(url: &str, markup: &str) -> PageSource {
    let document = Html::parse_document(markup);
    PageSource {
        url: url.to_string(),
        markup: markup.to_string(),
        title: extract_title(&document),
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Fetches and parses the page a harvest starts from
pub async fn fetch_page(fetcher: &dyn RemoteFetcher, url: &str) -> Result<PageSource> {
    let document = fetcher
        .fetch(url, false)
        .await
        .map_err(|failure| LinkhoundError::PageFetch {
            url: url.to_string(),
            status: failure.status,
            status_text: failure.status_text,
        })?;
    Ok(parse_page(&document.url, &document.body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        let html = r#"<html><head><title>Test Page</title></head><body></body></html>"#;
        let page = parse_page("https://example.com/page", html);
        assert_eq!(page.title, Some("Test Page".to_string()));
        assert_eq!(page.markup, html);
    }

    #[test]
    fn test_extract_title_with_whitespace() {
        let html = r#"<html><head><title>  Test Page  </title></head><body></body></html>"#;
        let page = parse_page("https://example.com/page", html);
        assert_eq!(page.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let html = r#"<html><head></head><body></body></html>"#;
        assert_eq!(parse_page("https://example.com/page", html).title, None);
    }

    #[test]
    fn test_empty_title() {
        let html = r#"<html><head><title>   </title></head></html>"#;
        assert_eq!(parse_page("https://example.com/page", html).title, None);
    }
}
