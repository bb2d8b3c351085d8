use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::dictionary::pattern::parse_replace_expression;

/// How a processor obtains its links, as written in `<link-search-pattern>`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchMethod {
    /// Unrecognized search pattern
    #[default]
    None,
    Id(String),
    Class(String),
    XPath(String),
    Replace { find: String, by: String },
    Expreg(String),
    SelfLink,
    CssQuery(String),
}

struct Grammar {
    regex: Regex,
    build: fn(&str) -> Option<SearchMethod>,
}

fn grammar(source: &str, build: fn(&str) -> Option<SearchMethod>) -> Grammar {
    Grammar {
        regex: Regex::new(source).expect("valid search grammar"),
        build,
    }
}

static GRAMMARS: LazyLock<Vec<Grammar>> = LazyLock::new(|| {
    vec![
        grammar(r"(?is)^id\s*:\s*(.+)$", |arg| {
            Some(SearchMethod::Id(arg.to_string()))
        }),
        grammar(r"(?is)^class\s*:\s*(.+)$", |arg| {
            Some(SearchMethod::Class(arg.to_string()))
        }),
        grammar(r"(?is)^xpath\s*:\s*(.+)$", |arg| {
            Some(SearchMethod::XPath(arg.to_string()))
        }),
        grammar(r"(?is)^(replace\s*:.+)$", |arg| {
            parse_replace_expression(arg).map(|(find, by)| SearchMethod::Replace { find, by })
        }),
        grammar(r"(?is)^expreg\s*:\s*(.+)$", |arg| {
            Some(SearchMethod::Expreg(arg.to_string()))
        }),
        grammar(r"(?i)^(self)$", |_| Some(SearchMethod::SelfLink)),
        grammar(r"(?is)^css\s+query\s*:\s*(.+)$", |arg| {
            Some(SearchMethod::CssQuery(arg.to_string()))
        }),
    ]
});

impl SearchMethod {
    /// Classifies a raw `<link-search-pattern>` value
    ///
    /// # Examples
    ///
    /// ```
    /// use linkhound::dictionary::SearchMethod;
    ///
    /// assert_eq!(SearchMethod::classify(" ID: main "), SearchMethod::Id("main".to_string()));
    /// assert_eq!(SearchMethod::classify("self").id(), 6);
    /// assert_eq!(SearchMethod::classify("whatever").id(), 0);
    /// ```
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        GRAMMARS
            .iter()
            .find_map(|grammar| {
                let caps = grammar.regex.captures(trimmed)?;
                (grammar.build)(caps[1].trim())
            })
            .unwrap_or(Self::None)
    }

    /// Numeric strategy identifier, 0 when unresolved
    pub fn id(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Id(_) => 1,
            Self::Class(_) => 2,
            Self::XPath(_) => 3,
            Self::Replace { .. } => 4,
            Self::Expreg(_) => 5,
            Self::SelfLink => 6,
            Self::CssQuery(_) => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Id(_) => "id",
            Self::Class(_) => "class",
            Self::XPath(_) => "xpath",
            Self::Replace { .. } => "replace",
            Self::Expreg(_) => "expreg",
            Self::SelfLink => "self",
            Self::CssQuery(_) => "css query",
        }
    }

    /// Strategies that read links out of element attributes
    pub fn is_attribute_based(&self) -> bool {
        matches!(
            self,
            Self::Id(_) | Self::Class(_) | Self::XPath(_) | Self::CssQuery(_)
        )
    }

    /// Whether the target page has to be retrieved before links can be found
    pub fn needs_document(&self) -> bool {
        self.is_attribute_based() || matches!(self, Self::Expreg(_))
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None | Self::SelfLink => write!(f, "{}", self.name()),
            Self::Id(arg)
            | Self::Class(arg)
            | Self::XPath(arg)
            | Self::Expreg(arg)
            | Self::CssQuery(arg) => write!(f, "{}: {}", self.name(), arg),
            Self::Replace { find, by } => write!(f, "replace: '{}', '{}'", find, by),
        }
    }
}
