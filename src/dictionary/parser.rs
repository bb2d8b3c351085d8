use crate::dictionary::pattern::{
    is_valid_domain, normalize_anchors, unescape_entities, validate_path_pattern, ANY_DOMAIN,
};
use crate::dictionary::strategy::SearchMethod;
use crate::dictionary::types::{Dictionary, DictionaryError, DomainSpec, HostRule, Interceptor};
use crate::extract::xpath;
use crate::DictionaryLoadError;
use regex::Regex;
use roxmltree::{Document, Node, ParsingOptions};
use std::collections::HashSet;
use std::path::Path;

/// `spec` attribute values this parser was written against
pub const SUPPORTED_SPECS: &[&str] = &["1.0", "2.0"];

/// Reads and validates a dictionary file
pub fn load_dictionary(path: impl AsRef<Path>) -> Result<Dictionary, DictionaryLoadError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let dictionary = parse_dictionary(&text)?;
    tracing::info!(
        "Loaded dictionary {} with {} rules ({} errors)",
        path.as_ref().display(),
        dictionary.rules.len(),
        dictionary.errors.len()
    );
    Ok(dictionary)
}

/// Validates a dictionary document
///
/// Only malformed XML is an `Err`. Every rule-level problem is accumulated in
/// [`Dictionary::errors`] and on the offending rule.
pub fn parse_dictionary(text: &str) -> Result<Dictionary, roxmltree::Error> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let document = Document::parse_with_options(text, options)?;
    let root = document.root_element();

    let mut dictionary = Dictionary {
        version: root.attribute("version").map(str::to_string),
        spec: root.attribute("spec").map(str::to_string),
        id: root.attribute("id").map(str::to_string),
        ..Dictionary::default()
    };

    for (name, value) in [
        ("version", &dictionary.version),
        ("spec", &dictionary.spec),
        ("id", &dictionary.id),
    ] {
        if value.is_none() {
            dictionary
                .errors
                .push(DictionaryError::MissingRootAttribute(name));
        }
    }

    if let Some(spec) = dictionary.spec.as_deref() {
        if !SUPPORTED_SPECS.contains(&spec) {
            tracing::warn!(
                "Dictionary spec '{}' is not one of {:?}, parsing it anyway",
                spec,
                SUPPORTED_SPECS
            );
        }
    }

    let mut seen_ids = HashSet::new();
    let hosts = root
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "host");

    for (index, host) in hosts.enumerate() {
        let id = match host.attribute("id").map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => {
                dictionary.errors.push(DictionaryError::MissingHostId {
                    position: index + 1,
                });
                continue;
            }
        };

        if !seen_ids.insert(id.to_string()) {
            dictionary
                .errors
                .push(DictionaryError::DuplicateHostId(id.to_string()));
            continue;
        }

        dictionary.rules.push(parse_host(host, id));
    }

    let rule_errors: Vec<DictionaryError> = dictionary
        .rules
        .iter()
        .flat_map(|rule| rule.errors.iter().cloned())
        .collect();
    dictionary.errors.extend(rule_errors);

    Ok(dictionary)
}

/// Position reached inside a `<host>` element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Field {
    #[default]
    Start,
    Domain,
    PreInterceptors,
    PathPattern,
    PostInterceptors,
    SearchPattern,
    LinkAttribute,
    FileNameAttribute,
    FileNameInterceptors,
}

impl Field {
    fn describe(&self) -> &'static str {
        match self {
            Self::Start => "the start of the host",
            Self::Domain => "<domain>",
            Self::PreInterceptors | Self::PostInterceptors | Self::FileNameInterceptors => {
                "<interceptor>"
            }
            Self::PathPattern => "<path-pattern>",
            Self::SearchPattern => "<link-search-pattern>",
            Self::LinkAttribute => "<link-attribute>",
            Self::FileNameAttribute => "<file-name-attribute>",
        }
    }
}

/// Elements a `<host>` may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostElement {
    Domain,
    DomainPattern,
    PathPattern,
    LinkSearchPattern,
    LinkAttribute,
    FileNameAttribute,
    Interceptor,
}

impl HostElement {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "domain" => Some(Self::Domain),
            "domain-pattern" => Some(Self::DomainPattern),
            "path-pattern" => Some(Self::PathPattern),
            "link-search-pattern" => Some(Self::LinkSearchPattern),
            "link-attribute" => Some(Self::LinkAttribute),
            "file-name-attribute" => Some(Self::FileNameAttribute),
            "interceptor" => Some(Self::Interceptor),
            _ => None,
        }
    }
}

/// Legal `(position, element) -> next position` moves
const TRANSITIONS: &[(Field, HostElement, Field)] = &[
    (Field::Start, HostElement::Domain, Field::Domain),
    (Field::Start, HostElement::DomainPattern, Field::Domain),
    (Field::Domain, HostElement::Interceptor, Field::PreInterceptors),
    (Field::Domain, HostElement::PathPattern, Field::PathPattern),
    (Field::PreInterceptors, HostElement::Interceptor, Field::PreInterceptors),
    (Field::PreInterceptors, HostElement::PathPattern, Field::PathPattern),
    (Field::PathPattern, HostElement::Interceptor, Field::PostInterceptors),
    (Field::PathPattern, HostElement::LinkSearchPattern, Field::SearchPattern),
    (Field::PostInterceptors, HostElement::Interceptor, Field::PostInterceptors),
    (Field::PostInterceptors, HostElement::LinkSearchPattern, Field::SearchPattern),
    (Field::SearchPattern, HostElement::LinkAttribute, Field::LinkAttribute),
    (Field::SearchPattern, HostElement::FileNameAttribute, Field::FileNameAttribute),
    (Field::SearchPattern, HostElement::Interceptor, Field::FileNameInterceptors),
    (Field::LinkAttribute, HostElement::FileNameAttribute, Field::FileNameAttribute),
    (Field::LinkAttribute, HostElement::Interceptor, Field::FileNameInterceptors),
    (Field::FileNameAttribute, HostElement::Interceptor, Field::FileNameInterceptors),
    (Field::FileNameInterceptors, HostElement::Interceptor, Field::FileNameInterceptors),
];

/// Tracks the last accepted field of a host
#[derive(Debug, Default)]
pub struct FieldCursor {
    position: Field,
}

impl FieldCursor {
    pub fn position(&self) -> Field {
        self.position
    }

    /// Moves past `element` if it is legal here; the cursor stays put otherwise
    pub fn advance(&mut self, element: HostElement) -> Option<Field> {
        let next = TRANSITIONS
            .iter()
            .find(|(from, on, _)| *from == self.position && *on == element)
            .map(|(_, _, to)| *to)?;
        self.position = next;
        Some(next)
    }
}

fn element_text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn parse_host(host: Node, id: &str) -> HostRule {
    let mut rule = HostRule::new(id);
    let mut cursor = FieldCursor::default();

    for child in host.children().filter(|n| n.is_element()) {
        let tag = child.tag_name().name();
        let Some(element) = HostElement::from_tag(tag) else {
            rule.errors.push(DictionaryError::UnknownElement {
                host: id.to_string(),
                element: tag.to_string(),
            });
            continue;
        };

        let before = cursor.position();
        let Some(position) = cursor.advance(element) else {
            rule.errors.push(DictionaryError::MisplacedElement {
                host: id.to_string(),
                element: tag.to_string(),
                after: before.describe(),
            });
            continue;
        };

        apply_element(&mut rule, element, position, &element_text(child));
    }

    for (missing, field) in [
        (rule.domain.is_none(), "domain"),
        (rule.path_pattern.is_none(), "path-pattern"),
        (rule.search == SearchMethod::None, "link-search-pattern"),
    ] {
        if missing {
            rule.errors.push(DictionaryError::MissingField {
                host: id.to_string(),
                field,
            });
        }
    }

    rule
}

fn apply_element(rule: &mut HostRule, element: HostElement, position: Field, value: &str) {
    let host = rule.id.clone();

    match element {
        HostElement::Domain => {
            if value == ANY_DOMAIN {
                rule.domain = Some(DomainSpec::Pattern(".*".to_string()));
            } else if is_valid_domain(value) {
                rule.domain = Some(DomainSpec::Literal(value.to_string()));
            } else {
                rule.errors.push(DictionaryError::InvalidDomain {
                    host,
                    value: value.to_string(),
                });
            }
        }
        HostElement::DomainPattern => {
            let source = normalize_anchors(&unescape_entities(value));
            match Regex::new(&source) {
                Ok(_) if !source.is_empty() => {
                    rule.domain = Some(DomainSpec::Pattern(value.to_string()));
                }
                Ok(_) => rule.errors.push(DictionaryError::InvalidDomainPattern {
                    host,
                    value: value.to_string(),
                    reason: "pattern is empty".to_string(),
                }),
                Err(e) => rule.errors.push(DictionaryError::InvalidDomainPattern {
                    host,
                    value: value.to_string(),
                    reason: e.to_string(),
                }),
            }
        }
        HostElement::PathPattern => match validate_path_pattern(value) {
            Ok(()) => rule.path_pattern = Some(value.to_string()),
            Err(reason) => rule.errors.push(DictionaryError::InvalidPathPattern {
                host,
                value: value.to_string(),
                reason,
            }),
        },
        HostElement::LinkSearchPattern => {
            rule.search_pattern = Some(value.to_string());
            rule.search = SearchMethod::classify(value);
            match &rule.search {
                SearchMethod::None => rule.errors.push(DictionaryError::UnknownSearchPattern {
                    host,
                    value: value.to_string(),
                }),
                SearchMethod::XPath(expression) => {
                    if let Err(e) = xpath::validate(expression) {
                        rule.errors.push(DictionaryError::InvalidXPath {
                            host,
                            value: expression.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
        HostElement::LinkAttribute => {
            // An unrecognized search pattern was already reported
            if rule.search == SearchMethod::None {
                return;
            }
            if !rule.search.is_attribute_based() {
                rule.errors.push(DictionaryError::LinkAttributeNotAllowed {
                    host,
                    method: rule.search.name(),
                });
            } else if !value.is_empty() {
                rule.link_attribute = Some(value.to_string());
            }
        }
        HostElement::FileNameAttribute => {
            if value.is_empty() || rule.search == SearchMethod::None {
                return;
            }
            if rule.search.is_attribute_based() {
                rule.file_name_attribute = Some(value.to_string());
            } else {
                rule.errors.push(DictionaryError::FileNameAttributeNotAllowed {
                    host,
                    method: rule.search.name(),
                });
            }
        }
        HostElement::Interceptor => match Interceptor::parse(value) {
            Ok(interceptor) => match position {
                Field::PreInterceptors => rule.pre_path_interceptors.push(interceptor),
                Field::PostInterceptors => rule.post_search_interceptors.push(interceptor),
                _ => rule.file_name_interceptors.push(interceptor),
            },
            Err(reason) => rule.errors.push(DictionaryError::InvalidInterceptor {
                host,
                value: value.to_string(),
                reason,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(hosts: &str) -> String {
        format!(
            r#"<?xml version="1.0"?><dictionary version="1" spec="2.0" id="test">{}</dictionary>"#,
            hosts
        )
    }

    #[test]
    fn test_well_ordered_host_has_no_errors() {
        let xml = wrap(
            r#"<host id="pics">
                <domain>toto.fr</domain>
                <interceptor>replace:'http:','https:'</interceptor>
                <path-pattern>gallery/\d+</path-pattern>
                <interceptor>replace:'_thumb',''</interceptor>
                <link-search-pattern>class: big</link-search-pattern>
                <link-attribute>data-full</link-attribute>
                <file-name-attribute>title</file-name-attribute>
                <interceptor>replace:'\s+','_'</interceptor>
            </host>"#,
        );
        let dictionary = parse_dictionary(&xml).unwrap();

        assert!(dictionary.errors.is_empty(), "{:?}", dictionary.errors);
        let rule = &dictionary.rules[0];
        assert!(rule.is_valid());
        assert_eq!(rule.domain, Some(DomainSpec::Literal("toto.fr".to_string())));
        assert_eq!(rule.search, SearchMethod::Class("big".to_string()));
        assert_eq!(rule.link_attribute.as_deref(), Some("data-full"));
        assert_eq!(rule.file_name_attribute.as_deref(), Some("title"));
        assert_eq!(rule.pre_path_interceptors.len(), 1);
        assert_eq!(rule.post_search_interceptors.len(), 1);
        assert_eq!(rule.file_name_interceptors.len(), 1);
    }

    #[test]
    fn test_missing_root_attributes() {
        let dictionary = parse_dictionary("<dictionary spec=\"2.0\"></dictionary>").unwrap();
        assert_eq!(
            dictionary.errors,
            vec![
                DictionaryError::MissingRootAttribute("version"),
                DictionaryError::MissingRootAttribute("id"),
            ]
        );
    }

    #[test]
    fn test_unsupported_spec_is_only_a_warning() {
        let xml = r#"<dictionary version="1" spec="9.9" id="x"></dictionary>"#;
        assert!(parse_dictionary(xml).unwrap().errors.is_empty());
    }

    #[test]
    fn test_out_of_order_element_is_positional_error() {
        let xml = wrap(
            r#"<host id="h">
                <path-pattern>img/.*</path-pattern>
                <domain>toto.fr</domain>
                <path-pattern>img/.*</path-pattern>
                <link-search-pattern>self</link-search-pattern>
            </host>"#,
        );
        let dictionary = parse_dictionary(&xml).unwrap();
        let rule = &dictionary.rules[0];

        assert_eq!(
            rule.errors,
            vec![DictionaryError::MisplacedElement {
                host: "h".to_string(),
                element: "path-pattern".to_string(),
                after: "the start of the host",
            }]
        );
        assert_eq!(rule.path_pattern.as_deref(), Some("img/.*"));
        assert!(!rule.is_valid());
    }

    #[test]
    fn test_invalid_content_still_moves_cursor() {
        let xml = wrap(
            r#"<host id="h">
                <domain>-bad-</domain>
                <path-pattern>img/.*</path-pattern>
                <link-search-pattern>self</link-search-pattern>
            </host>"#,
        );
        let rule = parse_dictionary(&xml).unwrap().rules.remove(0);
        assert_eq!(
            rule.errors,
            vec![
                DictionaryError::InvalidDomain {
                    host: "h".to_string(),
                    value: "-bad-".to_string()
                },
                DictionaryError::MissingField {
                    host: "h".to_string(),
                    field: "domain"
                },
            ]
        );
    }

    #[test]
    fn test_missing_fields_reported_once_each() {
        let xml = wrap(r#"<host id="empty"></host>"#);
        let dictionary = parse_dictionary(&xml).unwrap();
        let fields: Vec<_> = dictionary
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(
            fields,
            vec![
                "host 'empty': expected domain",
                "host 'empty': expected path-pattern",
                "host 'empty': expected link-search-pattern",
            ]
        );
        assert_eq!(dictionary.rules.len(), 1);
        assert_eq!(dictionary.valid_rules().count(), 0);
    }

    #[test]
    fn test_host_without_id_is_dropped() {
        let xml = wrap(r#"<host><domain>a.com</domain></host>"#);
        let dictionary = parse_dictionary(&xml).unwrap();
        assert!(dictionary.rules.is_empty());
        assert_eq!(
            dictionary.errors,
            vec![DictionaryError::MissingHostId { position: 1 }]
        );
    }

    #[test]
    fn test_duplicate_id_first_wins_without_its_errors() {
        let xml = wrap(
            r#"<host id="dup">
                <domain>a.com</domain>
                <path-pattern>x</path-pattern>
                <link-search-pattern>self</link-search-pattern>
            </host>
            <host id="dup">
                <domain>not valid</domain>
            </host>"#,
        );
        let dictionary = parse_dictionary(&xml).unwrap();
        assert_eq!(dictionary.rules.len(), 1);
        assert!(dictionary.rules[0].is_valid());
        assert_eq!(
            dictionary.errors,
            vec![DictionaryError::DuplicateHostId("dup".to_string())]
        );
    }

    #[test]
    fn test_any_domain_and_current_page() {
        let xml = wrap(
            r#"<host id="any">
                <domain>*</domain>
                <path-pattern>{current}</path-pattern>
                <link-search-pattern>css query: img.main</link-search-pattern>
            </host>"#,
        );
        let rule = parse_dictionary(&xml).unwrap().rules.remove(0);
        assert!(rule.is_valid());
        assert_eq!(rule.domain, Some(DomainSpec::Pattern(".*".to_string())));
        assert!(rule.targets_current_page());
    }

    #[test]
    fn test_attribute_rules() {
        let xml = wrap(
            r#"<host id="h">
                <domain>a.com</domain>
                <path-pattern>x</path-pattern>
                <link-search-pattern>self</link-search-pattern>
                <link-attribute>href</link-attribute>
                <file-name-attribute></file-name-attribute>
            </host>"#,
        );
        let rule = parse_dictionary(&xml).unwrap().rules.remove(0);
        assert_eq!(
            rule.errors,
            vec![DictionaryError::LinkAttributeNotAllowed {
                host: "h".to_string(),
                method: "self"
            }]
        );
    }

    #[test]
    fn test_non_empty_file_name_attribute_needs_attribute_strategy() {
        let xml = wrap(
            r#"<host id="h">
                <domain>a.com</domain>
                <path-pattern>x</path-pattern>
                <link-search-pattern>expreg: (a)</link-search-pattern>
                <file-name-attribute>title</file-name-attribute>
            </host>"#,
        );
        let rule = parse_dictionary(&xml).unwrap().rules.remove(0);
        assert!(matches!(
            rule.errors[0],
            DictionaryError::FileNameAttributeNotAllowed { method: "expreg", .. }
        ));
    }

    #[test]
    fn test_bad_interceptor_and_unknown_search() {
        let xml = wrap(
            r#"<host id="h">
                <domain>a.com</domain>
                <interceptor>swap:'a','b'</interceptor>
                <path-pattern>x</path-pattern>
                <link-search-pattern>grab everything</link-search-pattern>
                <mystery/>
            </host>"#,
        );
        let rule = parse_dictionary(&xml).unwrap().rules.remove(0);
        assert!(matches!(rule.errors[0], DictionaryError::InvalidInterceptor { .. }));
        assert!(matches!(rule.errors[1], DictionaryError::UnknownSearchPattern { .. }));
        assert!(matches!(rule.errors[2], DictionaryError::UnknownElement { .. }));
        assert!(matches!(
            rule.errors[3],
            DictionaryError::MissingField {
                field: "link-search-pattern",
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_search_skips_attribute_checks() {
        let xml = wrap(
            r#"<host id="h">
                <domain>a.com</domain>
                <path-pattern>x</path-pattern>
                <link-search-pattern>grab everything</link-search-pattern>
                <link-attribute>href</link-attribute>
                <file-name-attribute>title</file-name-attribute>
            </host>"#,
        );
        let rule = parse_dictionary(&xml).unwrap().rules.remove(0);
        assert_eq!(rule.errors.len(), 2, "{:?}", rule.errors);
        assert!(matches!(rule.errors[0], DictionaryError::UnknownSearchPattern { .. }));
        assert!(matches!(
            rule.errors[1],
            DictionaryError::MissingField {
                field: "link-search-pattern",
                ..
            }
        ));
    }

    #[test]
    fn test_xpath_expression_is_checked() {
        let xml = wrap(
            r#"<host id="good">
                <domain>a.com</domain>
                <path-pattern>x</path-pattern>
                <link-search-pattern>xpath: (//a[text()='Download'])[1]/@href</link-search-pattern>
            </host>
            <host id="bad">
                <domain>a.com</domain>
                <path-pattern>x</path-pattern>
                <link-search-pattern>xpath: //a[@href</link-search-pattern>
            </host>"#,
        );
        let dictionary = parse_dictionary(&xml).unwrap();
        assert!(dictionary.rules[0].is_valid());
        assert!(!dictionary.rules[1].is_valid());
        assert!(matches!(
            &dictionary.rules[1].errors[0],
            DictionaryError::InvalidXPath { host, .. } if host == "bad"
        ));
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(parse_dictionary("<dictionary><host></dictionary>").is_err());
    }

    #[test]
    fn test_cursor_table() {
        let mut cursor = FieldCursor::default();
        assert_eq!(cursor.advance(HostElement::Interceptor), None);
        assert_eq!(cursor.position(), Field::Start);
        assert_eq!(cursor.advance(HostElement::DomainPattern), Some(Field::Domain));
        assert_eq!(
            cursor.advance(HostElement::Interceptor),
            Some(Field::PreInterceptors)
        );
        assert_eq!(cursor.advance(HostElement::LinkSearchPattern), None);
        assert_eq!(
            cursor.advance(HostElement::PathPattern),
            Some(Field::PathPattern)
        );
    }

    #[test]
    fn test_load_dictionary_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, wrap("").as_bytes()).unwrap();
        let dictionary = load_dictionary(file.path()).unwrap();
        assert_eq!(dictionary.id.as_deref(), Some("test"));
        assert!(load_dictionary("/nonexistent/dictionary.xml").is_err());
    }
}
