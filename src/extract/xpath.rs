//! XPath evaluation over page markup
//!
//! Markup is copied into an `sxd_document` tree and the expression is
//! evaluated by `sxd_xpath`, so the whole XPath 1.0 language is available.
//! Documents opening with an XML declaration are parsed as XML (feeds keep
//! their `<link>` text); everything else goes through the HTML parser first.
//!
//! A node-set result yields one link per node in document order:
//! attributes and text nodes contribute their value, elements their link
//! attribute. A non-empty string result is a single link.

use crate::dictionary::unescape_entities;
use crate::extract::{Attributes, FoundLink};
use scraper::{ElementRef, Html};
use sxd_document::dom::{self, ChildOfRoot, Document};
use sxd_document::Package;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{evaluate_xpath, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XPathError {
    #[error("empty XPath expression")]
    Empty,

    #[error("invalid XPath expression '{expression}': {reason}")]
    Invalid { expression: String, reason: String },
}

/// Checks that `expression` compiles and evaluates
///
/// The expression is run against an empty document, which surfaces syntax
/// errors as well as unknown functions.
///
/// # Examples
///
/// ```
/// use linkhound::extract::xpath::validate;
///
/// assert!(validate("(//a[text()='Download'])[1]/@href").is_ok());
/// assert!(validate("//a[").is_err());
/// ```
pub fn validate(expression: &str) -> Result<(), XPathError> {
    let expression = prepare(expression)?;
    let package = Package::new();
    let document = package.as_document();
    evaluate_xpath(&document, &expression)
        .map(|_| ())
        .map_err(|e| invalid(&expression, e))
}

/// Evaluates `expression` against `markup`
pub fn evaluate(
    expression: &str,
    markup: &str,
    attributes: Attributes<'_>,
) -> Result<Vec<FoundLink>, XPathError> {
    let expression = prepare(expression)?;
    let package = load(markup);
    let document = package.as_document();

    let value = evaluate_xpath(&document, &expression).map_err(|e| invalid(&expression, e))?;
    let found = match value {
        Value::Nodeset(nodes) => nodes
            .document_order()
            .into_iter()
            .filter_map(|node| node_link(node, attributes))
            .collect(),
        Value::String(text) => FoundLink::new(text.trim())
            .non_empty()
            .into_iter()
            .collect(),
        Value::Boolean(_) | Value::Number(_) => {
            tracing::debug!("XPath '{}' does not select nodes", expression);
            Vec::new()
        }
    };
    Ok(found)
}

fn prepare(expression: &str) -> Result<String, XPathError> {
    let expression = unescape_entities(expression.trim());
    if expression.is_empty() {
        return Err(XPathError::Empty);
    }
    Ok(expression)
}

fn invalid(expression: &str, error: impl std::fmt::Display) -> XPathError {
    XPathError::Invalid {
        expression: expression.to_string(),
        reason: error.to_string(),
    }
}

fn node_link(node: Node<'_>, attributes: Attributes<'_>) -> Option<FoundLink> {
    match node {
        Node::Element(element) => {
            let link = match attributes.link {
                Some(name) => element.attribute_value(name),
                None => element
                    .attribute_value("src")
                    .or_else(|| element.attribute_value("href")),
            }?;
            let name = attributes
                .file_name
                .and_then(|name| element.attribute_value(name))
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string);
            FoundLink {
                link: link.trim().to_string(),
                name,
            }
            .non_empty()
        }
        Node::Attribute(attribute) => FoundLink::new(attribute.value().trim()).non_empty(),
        Node::Text(text) => FoundLink::new(text.text().trim()).non_empty(),
        _ => None,
    }
}

/// Parses `markup` into a document XPath can run on
fn load(markup: &str) -> Package {
    let trimmed = markup.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with("<?xml") {
        if let Ok(package) = sxd_document::parser::parse(trimmed) {
            if !has_html_root(&package.as_document()) {
                return package;
            }
        }
    }
    from_html(markup)
}

fn has_html_root(document: &Document<'_>) -> bool {
    document.root().children().into_iter().any(|child| match child {
        ChildOfRoot::Element(element) => element
            .name()
            .local_part()
            .eq_ignore_ascii_case("html"),
        _ => false,
    })
}

/// Copies an HTML5-parsed page into a fresh `sxd_document` tree
fn from_html(markup: &str) -> Package {
    let html = Html::parse_document(markup);
    let package = Package::new();
    {
        let document = package.as_document();
        let root = copy_element(&document, html.root_element());
        document.root().append_child(root);
    }
    package
}

fn copy_element<'d>(document: &Document<'d>, source: ElementRef<'_>) -> dom::Element<'d> {
    let value = source.value();
    let element = document.create_element(value.name());
    for (name, attribute) in value.attrs() {
        element.set_attribute_value(name, attribute);
    }

    for child in source.children() {
        match child.value() {
            scraper::Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    element.append_child(copy_element(document, child));
                }
            }
            scraper::Node::Text(text) => {
                let text: &str = text;
                element.append_child(document.create_text(text));
            }
            _ => {}
        }
    }
    element
}

impl FoundLink {
    fn non_empty(self) -> Option<Self> {
        if self.link.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}
