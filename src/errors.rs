//! Error reporting for parsed trees and for tree construction.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Key under which group-level messages are reported.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Problems with user input. These are reported through [`ErrorMap`],
/// never returned as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("This field is required")]
    RequiredFieldMissing,
    #[error("{0}")]
    ValidationFailed(String),
    #[error("If any of {} are provided, all must be provided", .sources.join(", "))]
    GroupRequirementUnmet { sources: Vec<String> },
}

/// Mistakes made while declaring a tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Optional has no effect on fewer than two children (got {0})")]
    OptionalTooSmall(usize),
    #[error("'{0}' combines no children")]
    EmptyCombinator(&'static str),
    #[error("filter '{dest}' declares an empty {what} list")]
    EmptyDeclaration { dest: String, what: &'static str },
    #[error("unknown field kind: {0}")]
    UnknownKind(String),
    #[error("field kind '{kind}' is misconfigured: {reason}")]
    InvalidKind { kind: String, reason: String },
}

/// Field-indexed error messages, serializable as `{"field": ["msg", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorMap(BTreeMap<String, Vec<String>>);

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, error: &FilterError) {
        self.0.entry(key.into()).or_default().push(error.to_string());
    }

    pub fn extend_key(&mut self, key: impl Into<String>, messages: impl IntoIterator<Item = String>) {
        self.0.entry(key.into()).or_default().extend(messages);
    }

    /// Merges `other` into `self`; messages under a shared key are concatenated.
    pub fn merge(&mut self, other: ErrorMap) {
        for (key, messages) in other.0 {
            self.extend_key(key, messages);
        }
    }

    /// Removes one occurrence of `error` under `key`, dropping the key once empty.
    pub fn remove(&mut self, key: &str, error: &FilterError) -> bool {
        let message = error.to_string();
        let Some(messages) = self.0.get_mut(key) else {
            return false;
        };
        let Some(pos) = messages.iter().position(|m| *m == message) else {
            return false;
        };
        messages.remove(pos);
        if messages.is_empty() {
            self.0.remove(key);
        }
        true
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
