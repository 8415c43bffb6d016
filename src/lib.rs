//! Composable query filters.
//!
//! A filter tree is built once from [`Filter`] leaves joined with `and`/`or`
//! and grouped with [`Optional`]. Each call to [`Node::parse`] reads an
//! [`Input`], validates it, and yields a [`ParseOutcome`] holding validity,
//! field-keyed errors, and a backend-neutral [`Predicate`]. The
//! [`sql_compiler`] module turns that predicate into PostgreSQL.

pub mod config;
pub mod errors;
pub mod filter;
pub mod input;
pub mod lookup;
pub mod outcome;
pub mod predicate;
pub mod sql_compiler;
pub mod tree;
pub mod validator;
pub mod value;

pub use config::{ConfigError, FilterConfig, NodeConfig};
pub use errors::{ErrorMap, FilterError, TreeError, NON_FIELD_ERRORS};
pub use filter::Filter;
pub use input::{Input, QueryParams};
pub use lookup::Lookup;
pub use outcome::{FieldOutcome, ParseOutcome, Presence};
pub use predicate::{Connector, Predicate, Term};
pub use sql_compiler::{CompileError, SqlCompiler, SqlConfig};
pub use tree::{and, or, Combinator, Node, Optional};
pub use validator::{Validate, ValidatorRegistry};
pub use value::Value;
