//! Key/value input sources.
//!
//! Anything implementing [`Input`] can feed a filter tree. Multi-value retrieval
//! is optional: sources that only hold one value per key get it wrapped into a
//! one-element list.

use crate::value::Value;
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

pub trait Input {
    /// The single value stored under `key`.
    fn get(&self, key: &str) -> Option<Value>;

    /// Every value stored under `key`.
    fn get_list(&self, key: &str) -> Option<Vec<Value>> {
        self.get(key).map(Value::into_list)
    }

    fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl<T: Input + ?Sized> Input for &T {
    fn get(&self, key: &str) -> Option<Value> {
        (**self).get(key)
    }

    fn get_list(&self, key: &str) -> Option<Vec<Value>> {
        (**self).get_list(key)
    }

    fn contains_key(&self, key: &str) -> bool {
        (**self).contains_key(key)
    }
}

impl<K, V, S> Input for HashMap<K, V, S>
where
    K: Borrow<str> + Eq + Hash,
    V: Clone + Into<Value>,
    S: BuildHasher,
{
    fn get(&self, key: &str) -> Option<Value> {
        HashMap::get(self, key).cloned().map(Into::into)
    }

    fn contains_key(&self, key: &str) -> bool {
        HashMap::contains_key(self, key)
    }
}

impl<K, V> Input for BTreeMap<K, V>
where
    K: Borrow<str> + Ord,
    V: Clone + Into<Value>,
{
    fn get(&self, key: &str) -> Option<Value> {
        BTreeMap::get(self, key).cloned().map(Into::into)
    }

    fn contains_key(&self, key: &str) -> bool {
        BTreeMap::contains_key(self, key)
    }
}

impl Input for serde_json::Map<String, serde_json::Value> {
    fn get(&self, key: &str) -> Option<Value> {
        serde_json::Map::get(self, key).map(Value::from)
    }
}

impl Input for serde_json::Value {
    fn get(&self, key: &str) -> Option<Value> {
        self.as_object().and_then(|obj| Input::get(obj, key))
    }
}

/// An ordered, multi-valued map of decoded query-string parameters.
///
/// `get` returns the last value given for a key; `get_list` returns all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Parses `a=1&a=2&name=J%C3%BCrgen`, with or without a leading `?`.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl Input for QueryParams {
    fn get(&self, key: &str) -> Option<Value> {
        self.values(key).last().map(Value::from)
    }

    /// An empty element stands for null, so `parent__in=1&parent__in=` can
    /// reach `none_to_isnull`.
    fn get_list(&self, key: &str) -> Option<Vec<Value>> {
        let values: Vec<Value> = self
            .values(key)
            .map(|v| if v.is_empty() { Value::Null } else { Value::from(v) })
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values)
        }
    }

    fn contains_key(&self, key: &str) -> bool {
        self.values(key).next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_hashmap_single_value_as_list() {
        let data = HashMap::from([("ids", "3")]);
        assert_eq!(data.get_list("ids"), Some(vec![Value::from("3")]));
        assert_eq!(data.get_list("other"), None);
    }

    #[test]
    fn test_query_params_multi_values() {
        let params = QueryParams::parse("?field=3&field=6&name=J%C3%BCrgen+K");
        assert_eq!(params.len(), 3);
        assert_eq!(Input::get(&params, "field"), Some(Value::from("6")));
        assert_eq!(
            params.get_list("field"),
            Some(vec![Value::from("3"), Value::from("6")])
        );
        assert_eq!(Input::get(&params, "name"), Some(Value::from("Jürgen K")));
        assert!(!Input::contains_key(&params, "missing"));
        assert!(!params.is_empty());
        assert!(QueryParams::parse("").is_empty());
    }

    #[test]
    fn test_query_params_empty_list_element_is_null() {
        let params = QueryParams::parse("parent__in=1&parent__in=");
        assert_eq!(
            params.get_list("parent__in"),
            Some(vec![Value::from("1"), Value::Null])
        );
        assert_eq!(Input::get(&params, "parent__in"), Some(Value::from("")));
    }

    #[test]
    fn test_json_object_input() {
        let data = json!({"ids": [1, null], "name": "x"});
        assert_eq!(
            data.get_list("ids"),
            Some(vec![Value::Int(1), Value::Null])
        );
        assert_eq!(data.get_list("name"), Some(vec![Value::from("x")]));
        assert_eq!(Input::get(&json!([1, 2]), "name"), None);
    }
}
