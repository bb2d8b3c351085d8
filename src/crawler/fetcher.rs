//! Remote document fetching
//!
//! Processors whose strategy needs the target page retrieve it through a
//! [`RemoteFetcher`]. Failures never surface as errors to the caller's
//! control flow: they are values carrying an HTTP-like status.

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::fmt;
use std::time::Duration;

/// Status text reported when a forced XML fetch is not well-formed
pub const INVALID_XML: &str = "Invalid XML document.";

/// A successfully retrieved document
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Why a fetch produced no usable document
///
/// `status` is 0 when the transport failed before any response arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub status: u16,
    pub status_text: String,
}

impl FetchFailure {
    pub fn transport(error: impl fmt::Display) -> Self {
        Self {
            status: 0,
            status_text: error.to_string(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.status_text)
    }
}

impl std::error::Error for FetchFailure {}

/// Retrieves target documents for processors
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetches `url`; with `force_xml` the body must be well-formed XML
    async fn fetch(&self, url: &str, force_xml: bool) -> Result<FetchedDocument, FetchFailure>;
}

/// Builds an HTTP client with proper configuration
///
/// The user agent reads `CrawlerName/Version (+ContactURL; ContactEmail)`.
///
/// # Example
///
/// ```no_run
/// use linkhound::config::UserAgentConfig;
/// use linkhound::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "linkhound".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`RemoteFetcher`] over a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, force_xml: bool) -> Result<FetchedDocument, FetchFailure> {
        tracing::debug!("Fetching {} (force_xml={})", url, force_xml);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchFailure::transport("Request timeout")
            } else if e.is_connect() {
                FetchFailure::transport("Connection refused")
            } else {
                FetchFailure::transport(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(FetchFailure::transport)?;

        if force_xml {
            if let Err(e) = roxmltree::Document::parse(&body) {
                tracing::debug!("{} is not well-formed XML: {}", url, e);
                return Err(FetchFailure {
                    status: status.as_u16(),
                    status_text: INVALID_XML.to_string(),
                });
            }
        }

        Ok(FetchedDocument {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestHarvester".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&create_test_config()).is_ok());
    }

    #[test]
    fn test_failure_display() {
        let failure = FetchFailure {
            status: 200,
            status_text: INVALID_XML.to_string(),
        };
        assert_eq!(failure.to_string(), "200 Invalid XML document.");
        assert_eq!(FetchFailure::transport("boom").status, 0);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_status_zero() {
        let fetcher = HttpFetcher::from_config(&create_test_config()).unwrap();
        let failure = fetcher
            .fetch("http://127.0.0.1:1/nothing", false)
            .await
            .unwrap_err();
        assert_eq!(failure.status, 0);
    }

    #[tokio::test]
    async fn test_forced_xml_rejects_malformed_body() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/f.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss><br></rss2>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ok.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss><br/></rss>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::from_config(&create_test_config()).unwrap();
        let url = format!("{}/f.xml", server.uri());

        let failure = fetcher.fetch(&url, true).await.unwrap_err();
        assert_eq!(
            failure,
            FetchFailure {
                status: 200,
                status_text: INVALID_XML.to_string(),
            }
        );

        let document = fetcher.fetch(&url, false).await.unwrap();
        assert_eq!(document.status, 200);
        assert_eq!(document.body, "<rss><br></rss2>");

        let valid = format!("{}/ok.xml", server.uri());
        assert!(fetcher.fetch(&valid, true).await.is_ok());
    }
}
