//! Rule dictionary: parsing, validation and pattern compilation
//!
//! A dictionary is an XML document of `<host>` rules. Each rule names a
//! domain, a path pattern selecting links on a page, and a link search
//! pattern telling how the links of a matched page are found.

mod parser;
mod pattern;
mod strategy;
mod types;

pub use parser::{
    load_dictionary, parse_dictionary, Field, FieldCursor, HostElement, SUPPORTED_SPECS,
};
pub use pattern::{
    compile_domain_pattern, compile_url_patterns, domain_matches, is_valid_domain,
    normalize_anchors, parse_replace_expression, to_replacement_template, unescape_entities,
    validate_path_pattern, UrlPattern, ANY_DOMAIN, CURRENT_PAGE_PATH,
};
pub use strategy::SearchMethod;
pub use types::{apply_interceptors, Dictionary, DictionaryError, DomainSpec, HostRule, Interceptor};
