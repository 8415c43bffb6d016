//! Filter trees: leaves combined with AND/OR, plus all-or-none optional groups.
//!
//! ```text
//!            or
//!          /    \
//!   username    and
//!              /   \
//!          email   first_name
//! ```
//!
//! Build trees with [`and`], [`or`] and [`Optional::new`], then call
//! [`Node::parse`] once per request. Parsing is depth-first and every child sees
//! the same input.

use crate::errors::{FilterError, TreeError, NON_FIELD_ERRORS};
use crate::filter::Filter;
use crate::input::Input;
use crate::outcome::ParseOutcome;
use crate::predicate::Connector;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum Node {
    Leaf(Filter),
    Combinator(Combinator),
    Optional(Optional),
}

/// A binary AND/OR node.
#[derive(Debug, Clone)]
pub struct Combinator {
    connector: Connector,
    left: Box<Node>,
    right: Box<Node>,
    negate: bool,
}

/// Children whose `required` flags only apply once any of them is present.
///
/// `Optional::new([first_name.required(true), last_name.required(true)])` accepts
/// neither name or both, but rejects just one. Children without `required` may
/// be present or absent freely.
#[derive(Debug, Clone)]
pub struct Optional {
    children: Vec<Node>,
    negate: bool,
}

pub fn and(left: impl Into<Node>, right: impl Into<Node>) -> Node {
    Node::Combinator(Combinator::new(Connector::And, left, right))
}

pub fn or(left: impl Into<Node>, right: impl Into<Node>) -> Node {
    Node::Combinator(Combinator::new(Connector::Or, left, right))
}

impl Node {
    pub fn and(self, other: impl Into<Node>) -> Node {
        and(self, other)
    }

    pub fn or(self, other: impl Into<Node>) -> Node {
        or(self, other)
    }

    /// Inverts this node's predicate. Validity and errors are unaffected.
    pub fn negated(self) -> Node {
        match self {
            Node::Leaf(filter) => Node::Leaf(filter.negate()),
            Node::Combinator(mut c) => {
                c.negate = !c.negate;
                Node::Combinator(c)
            }
            Node::Optional(mut o) => {
                o.negate = !o.negate;
                Node::Optional(o)
            }
        }
    }

    /// Folds `nodes` left to right with `connector`.
    pub fn fold(connector: Connector, nodes: impl IntoIterator<Item = Node>) -> Result<Node, TreeError> {
        let name = match connector {
            Connector::And => "and",
            Connector::Or => "or",
        };
        nodes
            .into_iter()
            .reduce(|l, r| Node::Combinator(Combinator::new(connector, l, r)))
            .ok_or(TreeError::EmptyCombinator(name))
    }

    pub fn parse(&self, input: &dyn Input) -> ParseOutcome {
        match self {
            Node::Leaf(filter) => filter.parse(input),
            Node::Combinator(c) => c.parse(input),
            Node::Optional(o) => o.parse(input),
        }
    }

    /// Every leaf, left to right.
    pub fn leaves(&self) -> Vec<&Filter> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a Filter>) {
        match self {
            Node::Leaf(filter) => leaves.push(filter),
            Node::Combinator(c) => {
                c.left.collect_leaves(leaves);
                c.right.collect_leaves(leaves);
            }
            Node::Optional(o) => o.children.iter().for_each(|child| child.collect_leaves(leaves)),
        }
    }
}

impl From<Filter> for Node {
    fn from(filter: Filter) -> Self {
        Node::Leaf(filter)
    }
}

impl From<Combinator> for Node {
    fn from(combinator: Combinator) -> Self {
        Node::Combinator(combinator)
    }
}

impl From<Optional> for Node {
    fn from(optional: Optional) -> Self {
        Node::Optional(optional)
    }
}

impl Combinator {
    pub fn new(connector: Connector, left: impl Into<Node>, right: impl Into<Node>) -> Self {
        Self {
            connector,
            left: Box::new(left.into()),
            right: Box::new(right.into()),
            negate: false,
        }
    }

    pub fn connector(&self) -> Connector {
        self.connector
    }

    pub fn left(&self) -> &Node {
        &self.left
    }

    pub fn right(&self) -> &Node {
        &self.right
    }

    pub fn parse(&self, input: &dyn Input) -> ParseOutcome {
        let left = self.left.parse(input);
        let right = self.right.parse(input);
        let outcome = ParseOutcome::join(self.connector, left, right);
        if self.negate {
            outcome.negated()
        } else {
            outcome
        }
    }
}

impl Optional {
    pub fn new(children: impl IntoIterator<Item = Node>) -> Result<Self, TreeError> {
        let children: Vec<Node> = children.into_iter().collect();
        if children.len() < 2 {
            return Err(TreeError::OptionalTooSmall(children.len()));
        }
        Ok(Self {
            children,
            negate: false,
        })
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// First source of every leaf below, sorted and deduplicated.
    fn member_sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self
            .children
            .iter()
            .flat_map(Node::leaves)
            .map(|leaf| leaf.sources_list()[0].clone())
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }

    pub fn parse(&self, input: &dyn Input) -> ParseOutcome {
        let mut outcome = self
            .children
            .iter()
            .map(|child| child.parse(input))
            .reduce(|acc, next| ParseOutcome::join(Connector::And, acc, next))
            .unwrap_or_else(ParseOutcome::empty);

        if outcome.is_present() {
            // Absence excused by a nested group no longer holds once a sibling is present.
            let mut unmet = false;
            for field in outcome.fields.iter_mut().filter(|f| f.is_absent_required()) {
                if field.excused {
                    outcome.errors.push(&field.dest, &FilterError::RequiredFieldMissing);
                    field.excused = false;
                    field.valid = false;
                }
                unmet = true;
            }
            if unmet {
                let sources = self.member_sources();
                debug!(?sources, "optional group partially provided");
                outcome
                    .errors
                    .push(NON_FIELD_ERRORS, &FilterError::GroupRequirementUnmet { sources });
                outcome.valid = false;
            }
        } else {
            // Nothing was provided, so nothing is missing.
            for field in outcome.fields.iter_mut().filter(|f| f.is_missing_required()) {
                outcome.errors.remove(&field.dest, &FilterError::RequiredFieldMissing);
                field.excused = true;
                field.valid = true;
            }
            outcome.valid = outcome.errors.is_empty();
        }

        if self.negate {
            outcome.negated()
        } else {
            outcome
        }
    }
}
