//! Immutable results of parsing a tree against one input.
//!
//! Parsing never mutates the tree: every call to [`Node::parse`](crate::tree::Node::parse)
//! builds a fresh [`ParseOutcome`], so a single tree can serve concurrent requests.

use crate::errors::ErrorMap;
use crate::lookup::Lookup;
use crate::predicate::{Connector, Predicate};
use crate::value::Value;
use serde::Serialize;

/// How a leaf obtained its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Absent,
    Provided,
    Defaulted,
}

/// What one leaf made of the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldOutcome {
    pub dest: String,
    /// First declared source name.
    pub source: String,
    /// The input key that supplied the value, if any.
    pub key: Option<String>,
    pub presence: Presence,
    pub required: bool,
    pub active_lookup: Option<Lookup>,
    pub value: Option<Value>,
    pub valid: bool,
    /// Set when an enclosing group sanctioned this field's absence.
    #[serde(skip)]
    pub(crate) excused: bool,
}

impl FieldOutcome {
    pub fn is_present(&self) -> bool {
        self.presence == Presence::Provided
    }

    /// Required but given nothing, whether or not a group excused it.
    pub(crate) fn is_absent_required(&self) -> bool {
        self.required && self.presence == Presence::Absent
    }

    pub fn is_missing_required(&self) -> bool {
        self.is_absent_required() && !self.excused
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseOutcome {
    pub(crate) valid: bool,
    pub(crate) errors: ErrorMap,
    pub(crate) predicate: Option<Predicate>,
    pub(crate) fields: Vec<FieldOutcome>,
}

impl ParseOutcome {
    /// The outcome of a node with no leaves.
    pub(crate) fn empty() -> Self {
        Self {
            valid: true,
            errors: ErrorMap::new(),
            predicate: None,
            fields: Vec::new(),
        }
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    /// The composed predicate; `None` means the tree has no opinion.
    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn into_predicate(self) -> Option<Predicate> {
        self.predicate
    }

    /// Leaf outcomes in declaration order.
    pub fn fields(&self) -> &[FieldOutcome] {
        &self.fields
    }

    /// The first leaf outcome with the given destination.
    pub fn field(&self, dest: &str) -> Option<&FieldOutcome> {
        self.fields.iter().find(|f| f.dest == dest)
    }

    /// Whether any leaf below received input.
    pub fn is_present(&self) -> bool {
        self.fields.iter().any(FieldOutcome::is_present)
    }

    /// Validity is always conjunctive; only the predicate follows `connector`.
    pub(crate) fn join(connector: Connector, left: ParseOutcome, right: ParseOutcome) -> Self {
        let mut errors = left.errors;
        errors.merge(right.errors);
        let mut fields = left.fields;
        fields.extend(right.fields);
        Self {
            valid: left.valid && right.valid,
            errors,
            predicate: Predicate::combine(connector, left.predicate, right.predicate),
            fields,
        }
    }

    pub(crate) fn negated(mut self) -> Self {
        self.predicate = self.predicate.map(Predicate::negate);
        self
    }
}
