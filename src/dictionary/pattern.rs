//! Pattern compiler
//!
//! Turns the domain, path and interceptor notations of a dictionary into
//! regular expressions that run against raw page markup.

use crate::dictionary::types::DomainSpec;
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// Path pattern meaning "the page being inspected is itself the target"
pub const CURRENT_PAGE_PATH: &str = "{current}";

/// Domain value matching every host
pub const ANY_DOMAIN: &str = "*";

/// Prefix shared by every compiled domain pattern
const SCHEME_AND_SUBDOMAINS: &str = r"https?://([-\w]+\.)*";

/// Replaces an unescaped `.` in a domain regex: a domain may not run into
/// the path or out of an attribute value
const DOMAIN_WILDCARD: &str = r#"[^<>"/]"#;

static DOMAIN_SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w[-\w.]*\w$").expect("valid domain regex"));

static REPLACE_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*replace\s*:\s*'(.*)'\s*,\s*'(.*)'\s*$").expect("valid replace regex")
});

/// A compiled pattern scanning page markup for candidate links
///
/// Capture group 1 holds the link.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    pub regex: Regex,
    /// Only host-relative links may match; absolute captures are rejected
    pub exclude_host: bool,
}

impl UrlPattern {
    pub fn source(&self) -> &str {
        self.regex.as_str()
    }
}

/// Strips one leading `^` and one trailing `$`
///
/// Compiled patterns are always embedded in a larger expression, so user
/// anchors would never match.
pub fn normalize_anchors(pattern: &str) -> String {
    let pattern = pattern.strip_prefix('^').unwrap_or(pattern);
    let pattern = match pattern.strip_suffix('$') {
        Some(stripped) if !stripped.ends_with('\\') => stripped,
        _ => pattern,
    };
    pattern.to_string()
}

/// Decodes the entity sequences a dictionary author uses to keep XML happy
pub fn unescape_entities(pattern: &str) -> String {
    pattern
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&dot;", ".")
        .replace("&amp;", "&")
}

/// Whether `domain` is an acceptable literal domain
pub fn is_valid_domain(domain: &str) -> bool {
    domain == ANY_DOMAIN || DOMAIN_SYNTAX.is_match(domain)
}

/// Checks the structural constraints on a path pattern
pub fn validate_path_pattern(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("path pattern is empty".to_string());
    }
    if path == CURRENT_PAGE_PATH {
        return Ok(());
    }
    if path.starts_with('/') {
        return Err("must not start with '/'".to_string());
    }
    if path.starts_with('^') {
        return Err("must not start with '^'".to_string());
    }
    if path.ends_with('$') {
        return Err("must not end with '$'".to_string());
    }
    Regex::new(&unescape_entities(path))
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Builds the regex source matching any URL of `domain`
///
/// # Examples
///
/// ```
/// use linkhound::dictionary::{compile_domain_pattern, DomainSpec};
///
/// let source = compile_domain_pattern(&DomainSpec::Literal("toto.fr".to_string()));
/// assert_eq!(source, r"https?://([-\w]+\.)*toto\.fr");
///
/// let source = compile_domain_pattern(&DomainSpec::Pattern(".*".to_string()));
/// assert_eq!(source, r#"https?://([-\w]+\.)*[^<>"/]*"#);
/// ```
pub fn compile_domain_pattern(domain: &DomainSpec) -> String {
    match domain {
        DomainSpec::Literal(name) if name == ANY_DOMAIN => {
            format!("{}{}*", SCHEME_AND_SUBDOMAINS, DOMAIN_WILDCARD)
        }
        DomainSpec::Literal(name) => format!("{}{}", SCHEME_AND_SUBDOMAINS, regex::escape(name)),
        DomainSpec::Pattern(source) => {
            let source = normalize_anchors(&unescape_entities(source));
            format!("{}{}", SCHEME_AND_SUBDOMAINS, narrow_wildcards(&source))
        }
    }
}

/// Replaces every wildcard `.` outside a character class by [`DOMAIN_WILDCARD`]
fn narrow_wildcards(source: &str) -> String {
    let mut narrowed = String::with_capacity(source.len());
    let mut escaped = false;
    let mut in_class = false;

    for c in source.chars() {
        if escaped {
            narrowed.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                narrowed.push(c);
            }
            '[' if !in_class => {
                in_class = true;
                narrowed.push(c);
            }
            ']' if in_class => {
                in_class = false;
                narrowed.push(c);
            }
            '.' if !in_class => narrowed.push_str(DOMAIN_WILDCARD),
            _ => narrowed.push(c),
        }
    }

    narrowed
}

fn build_regex(source: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(source).case_insensitive(true).build()
}

/// Whether `url` belongs to `domain`
pub fn domain_matches(domain: &DomainSpec, url: &str) -> bool {
    let source = format!("^(?:{})(?:[/:?#]|$)", compile_domain_pattern(domain));
    match build_regex(&source) {
        Ok(regex) => regex.is_match(url),
        Err(e) => {
            tracing::warn!("Domain pattern {:?} does not compile: {}", domain, e);
            false
        }
    }
}

/// Compiles the patterns used to find a rule's links in a page's markup
///
/// The first pattern matches quoted absolute URLs of the rule's domain. When
/// the page itself belongs to that domain, three more patterns pick up
/// host-relative `src`, `href` and `data-src` attribute values.
///
/// Structurally invalid input is logged and produces no pattern.
pub fn compile_url_patterns(
    current_page_url: &str,
    domain: &DomainSpec,
    path_pattern: &str,
    rule_id: &str,
) -> Vec<UrlPattern> {
    if let DomainSpec::Literal(name) = domain {
        if !is_valid_domain(name) {
            tracing::warn!("Rule '{}': invalid domain '{}'", rule_id, name);
            return Vec::new();
        }
    }
    if let Err(reason) = validate_path_pattern(path_pattern) {
        tracing::warn!(
            "Rule '{}': invalid path pattern '{}': {}",
            rule_id,
            path_pattern,
            reason
        );
        return Vec::new();
    }

    let domain_source = compile_domain_pattern(domain);
    let path = unescape_entities(path_pattern);

    let mut sources = vec![(format!(r#"["']({}/{})["']"#, domain_source, path), false)];
    if domain_matches(domain, current_page_url) {
        for attribute in ["src", "href", "data-src"] {
            sources.push((format!(r#"{}="(/?{})""#, attribute, path), true));
        }
    }

    let mut patterns = Vec::with_capacity(sources.len());
    for (source, exclude_host) in sources {
        match build_regex(&source) {
            Ok(regex) => patterns.push(UrlPattern {
                regex,
                exclude_host,
            }),
            Err(e) => {
                tracing::warn!("Rule '{}': pattern does not compile: {}", rule_id, e);
                return Vec::new();
            }
        }
    }
    patterns
}

/// Splits a `replace:'find','by'` expression into its two operands
pub fn parse_replace_expression(text: &str) -> Option<(String, String)> {
    REPLACE_EXPRESSION
        .captures(text)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}

/// Converts a `$1`/`$&`/`$$` replacement template into the regex crate's form
///
/// The regex crate reads `$1a` as a group named `1a`; braces keep the group
/// number separate from the text after it.
pub fn to_replacement_template(template: &str) -> String {
    let mut converted = String::with_capacity(template.len() + 8);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            converted.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                converted.push_str("$$");
            }
            Some('&') => {
                chars.next();
                converted.push_str("${0}");
            }
            Some(d) if d.is_ascii_digit() => {
                let mut group = String::new();
                while let Some(d) = chars.peek().copied().filter(|d| d.is_ascii_digit()) {
                    if group.len() == 2 {
                        break;
                    }
                    group.push(d);
                    chars.next();
                }
                converted.push_str(&format!("${{{}}}", group));
            }
            Some('<') => {
                chars.next();
                let name: String = chars.by_ref().take_while(|&c| c != '>').collect();
                converted.push_str(&format!("${{{}}}", name));
            }
            _ => converted.push_str("$$"),
        }
    }

    converted
}
