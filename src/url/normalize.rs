use crate::UrlError;
use url::Url;

/// Normalizes an absolute link into the key used by the already-visited cache
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything but HTTP(S)
/// 3. Lowercase the host (done by the parser)
/// 4. Remove the fragment, which never changes the downloaded resource
///
/// Path, query and scheme are kept verbatim: two links differing there may
/// serve different files.
///
/// # Examples
///
/// ```
/// use linkhound::url::normalize_url;
///
/// let url = normalize_url("http://WWW.EXAMPLE.COM/a.jpg#top").unwrap();
/// assert_eq!(url.as_str(), "http://www.example.com/a.jpg");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    url.set_fragment(None);

    Ok(url)
}

/// Cache key for a link, falling back to the trimmed raw text when the link
/// cannot be parsed
pub fn cache_key(link: &str) -> String {
    match normalize_url(link) {
        Ok(url) => url.to_string(),
        Err(_) => link.trim().to_string(),
    }
}
