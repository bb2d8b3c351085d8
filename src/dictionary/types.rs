use crate::dictionary::pattern::{
    parse_replace_expression, to_replacement_template, unescape_entities, CURRENT_PAGE_PATH,
};
use crate::dictionary::strategy::SearchMethod;
use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// How a host rule designates its domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainSpec {
    /// A plain host name, escaped before use
    Literal(String),
    /// A trusted regular expression source (`.*` matches any domain)
    Pattern(String),
}

/// An ordered find/replace step applied to a URL or a file name
///
/// The find expression is matched globally and case-insensitively; the
/// replacement accepts `$1`-style back-references.
#[derive(Debug, Clone)]
pub struct Interceptor {
    pub replace: String,
    pub by: String,
    regex: Regex,
    template: String,
}

impl Interceptor {
    pub fn new(replace: &str, by: &str) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(&unescape_entities(replace))
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            replace: replace.to_string(),
            by: by.to_string(),
            regex,
            template: to_replacement_template(by),
        })
    }

    /// Parses the `replace:'find','by'` form used in dictionaries
    pub fn parse(text: &str) -> Result<Self, String> {
        let (find, by) = parse_replace_expression(text)
            .ok_or_else(|| "expected replace:'find','by'".to_string())?;
        Self::new(&find, &by).map_err(|e| e.to_string())
    }

    pub fn apply(&self, input: &str) -> String {
        self.regex
            .replace_all(input, self.template.as_str())
            .into_owned()
    }
}

impl PartialEq for Interceptor {
    fn eq(&self, other: &Self) -> bool {
        self.replace == other.replace && self.by == other.by
    }
}

/// Runs `input` through every interceptor in order
pub fn apply_interceptors(interceptors: &[Interceptor], input: &str) -> String {
    interceptors
        .iter()
        .fold(input.to_string(), |acc, interceptor| interceptor.apply(&acc))
}

/// One dictionary entry
///
/// A rule carrying errors is kept so the errors can be shown, but
/// [`HostRule::is_valid`] keeps it out of matching.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRule {
    pub id: String,
    pub domain: Option<DomainSpec>,
    pub path_pattern: Option<String>,
    pub search_pattern: Option<String>,
    pub search: SearchMethod,
    pub link_attribute: Option<String>,
    pub file_name_attribute: Option<String>,
    /// Applied to matched page links before they become processors
    pub pre_path_interceptors: Vec<Interceptor>,
    /// Applied to the links a processor finds
    pub post_search_interceptors: Vec<Interceptor>,
    /// Applied to file names read through `file_name_attribute`
    pub file_name_interceptors: Vec<Interceptor>,
    pub errors: Vec<DictionaryError>,
}

impl HostRule {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domain: None,
            path_pattern: None,
            search_pattern: None,
            search: SearchMethod::None,
            link_attribute: None,
            file_name_attribute: None,
            pre_path_interceptors: Vec::new(),
            post_search_interceptors: Vec::new(),
            file_name_interceptors: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Whether the rule may take part in matching
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
            && self.domain.is_some()
            && self.path_pattern.is_some()
            && self.search != SearchMethod::None
    }

    /// Whether the rule targets the page being inspected rather than links on it
    pub fn targets_current_page(&self) -> bool {
        self.path_pattern.as_deref() == Some(CURRENT_PAGE_PATH)
    }
}

/// A loaded dictionary: every rule that had an id, plus every problem found
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    pub version: Option<String>,
    pub spec: Option<String>,
    pub id: Option<String>,
    pub rules: Vec<HostRule>,
    /// Dictionary-level errors followed by the errors of each kept rule
    pub errors: Vec<DictionaryError>,
}

impl Dictionary {
    /// Rules allowed to take part in matching
    pub fn valid_rules(&self) -> impl Iterator<Item = &HostRule> {
        self.rules.iter().filter(|rule| rule.is_valid())
    }

    pub fn rule(&self, id: &str) -> Option<&HostRule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A problem found while validating a dictionary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DictionaryError {
    #[error("dictionary: missing required attribute '{0}'")]
    MissingRootAttribute(&'static str),

    #[error("dictionary: host #{position} has no id and was ignored")]
    MissingHostId { position: usize },

    #[error("host '{0}': duplicate id, only the first definition is kept")]
    DuplicateHostId(String),

    #[error("host '{host}': <{element}> is not allowed after {after}")]
    MisplacedElement {
        host: String,
        element: String,
        after: &'static str,
    },

    #[error("host '{host}': unknown element <{element}>")]
    UnknownElement { host: String, element: String },

    #[error("host '{host}': invalid domain '{value}'")]
    InvalidDomain { host: String, value: String },

    #[error("host '{host}': invalid domain pattern '{value}': {reason}")]
    InvalidDomainPattern {
        host: String,
        value: String,
        reason: String,
    },

    #[error("host '{host}': invalid path pattern '{value}': {reason}")]
    InvalidPathPattern {
        host: String,
        value: String,
        reason: String,
    },

    #[error("host '{host}': unrecognized link search pattern '{value}'")]
    UnknownSearchPattern { host: String, value: String },

    #[error("host '{host}': invalid XPath expression '{value}': {reason}")]
    InvalidXPath {
        host: String,
        value: String,
        reason: String,
    },

    #[error("host '{host}': <link-attribute> cannot be used with a '{method}' search")]
    LinkAttributeNotAllowed { host: String, method: &'static str },

    #[error("host '{host}': <file-name-attribute> cannot be used with a '{method}' search")]
    FileNameAttributeNotAllowed { host: String, method: &'static str },

    #[error("host '{host}': invalid interceptor '{value}': {reason}")]
    InvalidInterceptor {
        host: String,
        value: String,
        reason: String,
    },

    #[error("host '{host}': expected {field}")]
    MissingField { host: String, field: &'static str },
}

impl DictionaryError {
    /// Host id the error belongs to, `None` for dictionary-level errors
    pub fn host(&self) -> Option<&str> {
        match self {
            Self::MissingRootAttribute(_) | Self::MissingHostId { .. } => None,
            Self::DuplicateHostId(host) => Some(host),
            Self::MisplacedElement { host, .. }
            | Self::UnknownElement { host, .. }
            | Self::InvalidDomain { host, .. }
            | Self::InvalidDomainPattern { host, .. }
            | Self::InvalidPathPattern { host, .. }
            | Self::UnknownSearchPattern { host, .. }
            | Self::InvalidXPath { host, .. }
            | Self::LinkAttributeNotAllowed { host, .. }
            | Self::FileNameAttributeNotAllowed { host, .. }
            | Self::InvalidInterceptor { host, .. }
            | Self::MissingField { host, .. } => Some(host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interceptor_backreference() {
        let interceptor = Interceptor::parse("replace:'/thumbs/(\\w+)','/full/$1'").unwrap();
        assert_eq!(
            interceptor.apply("http://a.com/thumbs/abc.jpg"),
            "http://a.com/full/abc.jpg"
        );
    }

    #[test]
    fn test_interceptor_is_global_and_case_insensitive() {
        let interceptor = Interceptor::new("x", "y").unwrap();
        assert_eq!(interceptor.apply("aXbxc"), "aybyc");
    }

    #[test]
    fn test_interceptor_chain_in_order() {
        let chain = vec![
            Interceptor::new("small", "medium").unwrap(),
            Interceptor::new("medium", "large").unwrap(),
        ];
        assert_eq!(apply_interceptors(&chain, "img_small.jpg"), "img_large.jpg");
    }

    #[test]
    fn test_interceptor_rejects_bad_syntax() {
        assert!(Interceptor::parse("swap:'a','b'").is_err());
        assert!(Interceptor::parse("replace:'(unclosed','b'").is_err());
    }

    #[test]
    fn test_rule_with_errors_is_not_valid() {
        let mut rule = HostRule::new("r");
        rule.domain = Some(DomainSpec::Literal("a.com".to_string()));
        rule.path_pattern = Some("img/.*".to_string());
        rule.search = SearchMethod::SelfLink;
        assert!(rule.is_valid());

        rule.errors.push(DictionaryError::MissingField {
            host: "r".to_string(),
            field: "domain",
        });
        assert!(!rule.is_valid());
    }

    #[test]
    fn test_error_host() {
        let error = DictionaryError::DuplicateHostId("h".to_string());
        assert_eq!(error.host(), Some("h"));
        assert_eq!(DictionaryError::MissingRootAttribute("id").host(), None);
    }
}
