//! Configuration module: loads filter trees from JSON files.
//!
//! ```json
//! {
//!   "sql": { "table": "users" },
//!   "tree": {
//!     "or": [
//!       { "filter": { "dest": "username", "lookups": "exact,icontains" } },
//!       { "optional": [
//!           { "filter": { "dest": "first_name", "required": true } },
//!           { "filter": { "dest": "last_name", "required": true } }
//!       ] }
//!     ]
//!   }
//! }
//! ```

use crate::errors::TreeError;
use crate::filter::Filter;
use crate::lookup::Lookup;
use crate::predicate::Connector;
use crate::sql_compiler::SqlConfig;
use crate::tree::{Node, Optional};
use crate::validator::{KindOptions, ValidatorRegistry};
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read config file {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// A string or a list of strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// One node of a configured tree, tagged by its kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeConfig {
    Filter(LeafConfig),
    And(Vec<NodeConfig>),
    Or(Vec<NodeConfig>),
    Optional(Vec<NodeConfig>),
    Not(Box<NodeConfig>),
}

/// Declaration of a leaf filter. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeafConfig {
    pub dest: String,
    #[serde(default)]
    pub source: Option<OneOrMany>,
    /// A list of lookup names, or one comma-separated string.
    #[serde(default)]
    pub lookups: Option<OneOrMany>,
    #[serde(default)]
    pub required: bool,
    /// `null` here is a real default, distinct from leaving the key out.
    #[serde(default, deserialize_with = "deserialize_some")]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub default_lookup: Option<String>,
    #[serde(default)]
    pub none_to_isnull: bool,
    #[serde(default)]
    pub negate: bool,
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Kind parameters such as `choices` or `pattern`.
    #[serde(default)]
    pub options: KindOptions,
}

fn default_kind() -> String {
    "text".to_string()
}

fn deserialize_some<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl LeafConfig {
    pub fn build(&self, registry: &ValidatorRegistry) -> Result<Filter, TreeError> {
        let mut filter = Filter::new(&self.dest);

        match &self.source {
            None => {}
            Some(OneOrMany::One(source)) => filter = filter.source(source),
            Some(OneOrMany::Many(sources)) if sources.is_empty() => {
                return Err(self.empty("source"));
            }
            Some(OneOrMany::Many(sources)) => filter = filter.sources(sources),
        }

        let lookups = match &self.lookups {
            None => vec![Lookup::Exact],
            Some(OneOrMany::One(csv)) => Lookup::parse_list(csv),
            Some(OneOrMany::Many(names)) => names.iter().map(Lookup::from).collect(),
        };
        if lookups.is_empty() {
            return Err(self.empty("lookups"));
        }

        filter = filter
            .lookups(lookups)
            .required(self.required)
            .none_to_isnull(self.none_to_isnull)
            .validator(registry.resolve(&self.kind, &self.options)?);

        if let Some(default) = &self.default {
            filter = filter.with_default(default);
        }
        if let Some(lookup) = &self.default_lookup {
            filter = filter.default_lookup(lookup);
        }
        if self.negate {
            filter = filter.negate();
        }
        Ok(filter)
    }

    fn empty(&self, what: &'static str) -> TreeError {
        TreeError::EmptyDeclaration {
            dest: self.dest.clone(),
            what,
        }
    }
}

impl NodeConfig {
    pub fn build(&self, registry: &ValidatorRegistry) -> Result<Node, TreeError> {
        match self {
            NodeConfig::Filter(leaf) => Ok(leaf.build(registry)?.into()),
            NodeConfig::And(children) => Node::fold(Connector::And, build_all(children, registry)?),
            NodeConfig::Or(children) => Node::fold(Connector::Or, build_all(children, registry)?),
            NodeConfig::Optional(children) => {
                Ok(Optional::new(build_all(children, registry)?)?.into())
            }
            NodeConfig::Not(inner) => Ok(inner.build(registry)?.negated()),
        }
    }
}

fn build_all(children: &[NodeConfig], registry: &ValidatorRegistry) -> Result<Vec<Node>, TreeError> {
    children.iter().map(|child| child.build(registry)).collect()
}

/// A filter tree together with the SQL adapter settings it is served with
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterConfig {
    pub tree: NodeConfig,
    #[serde(default)]
    pub sql: SqlConfig,
}

impl FilterConfig {
    /// Load a filter configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.to_path_buf()));
        }

        // 读取文件内容
        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::ReadFile {
            path: path_ref.to_path_buf(),
            source,
        })?;

        // 解析JSON
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_ref.display().to_string(),
            source,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: "<string>".to_string(),
            source,
        })
    }

    /// Build the configured tree, resolving field kinds through `registry`.
    pub fn build(&self, registry: &ValidatorRegistry) -> Result<Node, ConfigError> {
        Ok(self.tree.build(registry)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::QueryParams;
    use crate::value::Value;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const USERS: &str = r#"{
        "sql": { "table": "users", "max_in_values": 50 },
        "tree": {
            "or": [
                { "filter": { "dest": "username", "lookups": "exact,icontains" } },
                { "optional": [
                    { "filter": { "dest": "first_name", "required": true } },
                    { "filter": { "dest": "last_name", "required": true } }
                ] },
                { "filter": { "dest": "age", "kind": "integer", "lookups": ["gte", "lte"] } }
            ]
        }
    }"#;

    #[test]
    fn test_load_valid_json_config() {
        let temp_file = "test_filter_config.json";
        let mut file = fs::File::create(temp_file).unwrap();
        writeln!(file, "{}", USERS).unwrap();

        // 测试加载

        let config = FilterConfig::from_json_file(temp_file).unwrap();
        assert_eq!(config.sql.table, "users");
        assert_eq!(config.sql.max_in_values, 50);

        let tree = config.build(&ValidatorRegistry::with_builtins()).unwrap();
        let dests: Vec<&str> = tree.leaves().iter().map(|f| f.dest()).collect();
        assert_eq!(dests, vec!["username", "first_name", "last_name", "age"]);

        // 清理
        fs::remove_file(temp_file).ok();
    }

    #[test]
    fn test_invalid_json_config() {
        let temp_file = "test_invalid_filter_config.json";
        let mut file = fs::File::create(temp_file).unwrap();
        writeln!(file, "invalid json").unwrap();

        let result = FilterConfig::from_json_file(temp_file);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        // 清理
        fs::remove_file(temp_file).ok();
    }

    #[test]
    fn test_missing_file() {
        let result = FilterConfig::from_json_file("non_existent_filters.json");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_configured_tree_parses() {
        let config = FilterConfig::from_json_str(USERS).unwrap();
        let tree = config.build(&ValidatorRegistry::with_builtins()).unwrap();

        let outcome = tree.parse(&QueryParams::parse("first_name=Bob&age__gte=21"));
        assert!(!outcome.valid());
        assert!(outcome.errors().contains_key("last_name"));
        assert!(outcome.errors().contains_key("__all__"));

        let outcome = tree.parse(&QueryParams::parse("age__gte=abc"));
        assert_eq!(
            outcome.errors().get("age"),
            Some(&["Enter a whole number.".to_string()][..])
        );
    }

    #[test]
    fn test_null_default_is_kept() {
        let config = FilterConfig::from_json_str(
            r#"{ "tree": { "filter": { "dest": "parent", "default": null } } }"#,
        )
        .unwrap();
        let NodeConfig::Filter(leaf) = &config.tree else {
            panic!("expected a leaf");
        };
        assert_eq!(leaf.default, Some(serde_json::Value::Null));

        let err = config.build(&ValidatorRegistry::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Tree(TreeError::UnknownKind(_))));

        let tree = config.build(&ValidatorRegistry::with_builtins()).unwrap();
        let leaf = tree.leaves()[0];
        assert_eq!(leaf.default_value(), Some(&Value::Null));
    }

    #[test]
    fn test_declaration_errors() {
        let registry = ValidatorRegistry::with_builtins();

        let config = FilterConfig::from_json_str(
            r#"{ "tree": { "optional": [ { "filter": { "dest": "a" } } ] } }"#,
        )
        .unwrap();
        assert!(matches!(
            config.build(&registry),
            Err(ConfigError::Tree(TreeError::OptionalTooSmall(1)))
        ));

        let config =
            FilterConfig::from_json_str(r#"{ "tree": { "filter": { "dest": "a", "source": [] } } }"#)
                .unwrap();
        assert!(matches!(
            config.build(&registry),
            Err(ConfigError::Tree(TreeError::EmptyDeclaration { what: "source", .. }))
        ));

        let config = FilterConfig::from_json_str(r#"{ "tree": { "and": [] } }"#).unwrap();
        assert!(matches!(
            config.build(&registry),
            Err(ConfigError::Tree(TreeError::EmptyCombinator("and")))
        ));

        let config = FilterConfig::from_json_str(
            r#"{ "tree": { "filter": { "dest": "state", "kind": "choice" } } }"#,
        )
        .unwrap();
        assert!(matches!(
            config.build(&registry),
            Err(ConfigError::Tree(TreeError::InvalidKind { .. }))
        ));
    }

    #[test]
    fn test_unknown_leaf_keys_are_rejected() {
        let result = FilterConfig::from_json_str(
            r#"{ "tree": { "filter": { "dest": "a", "requried": true } } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        let result = FilterConfig::from_json_str(
            r#"{ "tree": { "filter": { "dest": "a", "kind": "choice", "options": { "choises": ["x"] } } } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        let config = FilterConfig::from_json_str(
            r#"{ "tree": { "filter": { "dest": "tags", "kind": "multiple_choice", "lookups": "in",
                "options": { "choices": ["red", "blue"] } } } }"#,
        )
        .unwrap();
        let tree = config.build(&ValidatorRegistry::with_builtins()).unwrap();
        let outcome = tree.parse(&QueryParams::parse("tags=red&tags=blue"));
        assert!(outcome.valid());
        assert_eq!(
            outcome.predicate().map(ToString::to_string),
            Some("tags IN ('red', 'blue')".to_string())
        );
    }

    #[test]
    fn test_not_and_kind_options() {
        let config = FilterConfig::from_json_str(
            r#"{ "tree": { "not": { "filter": {
                "dest": "state", "kind": "choice", "options": { "choices": ["open", "closed"] }
            } } } }"#,
        )
        .unwrap();
        let tree = config.build(&ValidatorRegistry::with_builtins()).unwrap();

        let outcome = tree.parse(&QueryParams::parse("state=open"));
        assert!(outcome.valid());
        assert_eq!(
            outcome.predicate().map(ToString::to_string),
            Some("NOT state = 'open'".to_string())
        );

        let outcome = tree.parse(&QueryParams::parse("state=merged"));
        assert!(!outcome.valid());
    }
}
