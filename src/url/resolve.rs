use crate::UrlError;
use url::Url;

/// Resolves a link found on a page against the page's URL
///
/// # Resolution Rules
///
/// 1. A link containing `://` after its first character is already absolute
///    and is returned unchanged
/// 2. A scheme-relative link (`//host/...`) takes the reference URL's scheme
/// 3. A root-relative link (`/...`) resolves against the reference origin
/// 4. Anything else resolves against the reference URL's directory, i.e. the
///    trailing file name of the reference is dropped before joining
///
/// # Examples
///
/// ```
/// use linkhound::url::resolve_relative;
///
/// let url = resolve_relative("test.jpg", "http://origin.com/dir/page").unwrap();
/// assert_eq!(url, "http://origin.com/dir/test.jpg");
///
/// let url = resolve_relative("/x.jpg", "http://origin.com/dir/page").unwrap();
/// assert_eq!(url, "http://origin.com/x.jpg");
/// ```
pub fn resolve_relative(link: &str, reference: &str) -> Result<String, UrlError> {
    let link = link.trim();

    if matches!(link.find("://"), Some(pos) if pos > 0) {
        return Ok(link.to_string());
    }

    let base = Url::parse(reference).map_err(|e| UrlError::Parse(e.to_string()))?;

    if let Some(rest) = link.strip_prefix("//") {
        return Ok(format!("{}://{}", base.scheme(), rest));
    }

    // Url::join covers both origin-relative and directory-relative links
    base.join(link)
        .map(|resolved| resolved.to_string())
        .map_err(|e| UrlError::Parse(format!("cannot resolve '{}': {}", link, e)))
}
