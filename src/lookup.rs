//! Lookup operators and how they are spelled in input keys.
//!
//! A lookup is appended to a source name with a double underscore
//! (`age__gte`). `exact` is the implicit lookup and is never spelled.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between a source name and its lookup suffix.
pub const LOOKUP_SEP: &str = "__";

/// A named comparison operator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Lookup {
    Exact,
    IExact,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Range,
    IsNull,
    Regex,
    IRegex,
    /// Any operator the core does not know about; passed through to the backend.
    Custom(String),
}

impl Lookup {
    pub fn name(&self) -> &str {
        match self {
            Lookup::Exact => "exact",
            Lookup::IExact => "iexact",
            Lookup::Contains => "contains",
            Lookup::IContains => "icontains",
            Lookup::StartsWith => "startswith",
            Lookup::IStartsWith => "istartswith",
            Lookup::EndsWith => "endswith",
            Lookup::IEndsWith => "iendswith",
            Lookup::Gt => "gt",
            Lookup::Gte => "gte",
            Lookup::Lt => "lt",
            Lookup::Lte => "lte",
            Lookup::In => "in",
            Lookup::Range => "range",
            Lookup::IsNull => "isnull",
            Lookup::Regex => "regex",
            Lookup::IRegex => "iregex",
            Lookup::Custom(name) => name,
        }
    }

    /// Multi-valued lookups read every value supplied for a key.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Lookup::In | Lookup::Range)
    }

    /// The input key under which this lookup is expected for `source`.
    pub fn key_for(&self, source: &str) -> String {
        match self {
            Lookup::Exact => source.to_string(),
            other => format!("{}{}{}", source, LOOKUP_SEP, other.name()),
        }
    }

    /// Splits a comma-separated list such as `"gte,lte"`.
    pub fn parse_list(list: &str) -> Vec<Lookup> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Lookup::from)
            .collect()
    }
}

impl From<&str> for Lookup {
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "exact" => Lookup::Exact,
            "iexact" => Lookup::IExact,
            "contains" => Lookup::Contains,
            "icontains" => Lookup::IContains,
            "startswith" => Lookup::StartsWith,
            "istartswith" => Lookup::IStartsWith,
            "endswith" => Lookup::EndsWith,
            "iendswith" => Lookup::IEndsWith,
            "gt" => Lookup::Gt,
            "gte" => Lookup::Gte,
            "lt" => Lookup::Lt,
            "lte" => Lookup::Lte,
            "in" => Lookup::In,
            "range" => Lookup::Range,
            "isnull" => Lookup::IsNull,
            "regex" => Lookup::Regex,
            "iregex" => Lookup::IRegex,
            _ => Lookup::Custom(name.trim().to_string()),
        }
    }
}

impl From<String> for Lookup {
    fn from(name: String) -> Self {
        Lookup::from(name.as_str())
    }
}

impl From<&String> for Lookup {
    fn from(name: &String) -> Self {
        Lookup::from(name.as_str())
    }
}

impl From<Lookup> for String {
    fn from(lookup: Lookup) -> Self {
        lookup.name().to_string()
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
