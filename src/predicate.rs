//! Backend-agnostic predicate trees.
//!
//! A [`Predicate`] mirrors the declared AND/OR structure of a filter tree. Leaves
//! are [`Term`]s of shape `(field, lookup, value)`; nothing is flattened or
//! reordered, so a backend adapter sees exactly the grouping the caller wrote.

use crate::lookup::Lookup;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical connector between two subtrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connector {
    And,
    Or,
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connector::And => f.write_str("AND"),
            Connector::Or => f.write_str("OR"),
        }
    }
}

/// An elementary comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Term {
    pub field: String,
    pub lookup: Lookup,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Term(Term),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn term(field: impl Into<String>, lookup: Lookup, value: impl Into<Value>) -> Self {
        Predicate::Term(Term {
            field: field.into(),
            lookup,
            value: value.into(),
        })
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn join(self, connector: Connector, other: Predicate) -> Self {
        match connector {
            Connector::And => self.and(other),
            Connector::Or => self.or(other),
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    /// Joins two optional predicates, treating an absent side as neutral.
    pub fn combine(
        connector: Connector,
        left: Option<Predicate>,
        right: Option<Predicate>,
    ) -> Option<Predicate> {
        match (left, right) {
            (Some(l), Some(r)) => Some(l.join(connector, r)),
            (Some(p), None) | (None, Some(p)) => Some(p),
            (None, None) => None,
        }
    }

    /// All terms, depth-first, left to right.
    pub fn terms(&self) -> Vec<&Term> {
        let mut terms = Vec::new();
        self.collect_terms(&mut terms);
        terms
    }

    fn collect_terms<'a>(&'a self, terms: &mut Vec<&'a Term>) {
        match self {
            Predicate::Term(term) => terms.push(term),
            Predicate::And(left, right) | Predicate::Or(left, right) => {
                left.collect_terms(terms);
                right.collect_terms(terms);
            }
            Predicate::Not(inner) => inner.collect_terms(terms),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.lookup, &self.value) {
            (Lookup::Exact, value) => write!(f, "{} = {}", self.field, value),
            (Lookup::IsNull, Value::Bool(false)) => write!(f, "{} IS NOT NULL", self.field),
            (Lookup::IsNull, _) => write!(f, "{} IS NULL", self.field),
            (Lookup::In, value) => write!(f, "{} IN {}", self.field, value),
            (lookup, value) => {
                write!(f, "{} {} {}", self.field, lookup.name().to_uppercase(), value)
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Term(term) => write!(f, "{}", term),
            Predicate::And(left, right) => write!(f, "({} AND {})", left, right),
            Predicate::Or(left, right) => write!(f, "({} OR {})", left, right),
            Predicate::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}
