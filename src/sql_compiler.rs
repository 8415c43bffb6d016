//! SQL compiler that turns filter predicates into sea-query expressions.
//!
//! This is one backend adapter among many possible ones: the core only hands
//! over a [`Predicate`], and this module decides what each lookup means in
//! PostgreSQL.

use crate::lookup::Lookup;
use crate::predicate::{Predicate, Term};
use crate::value::Value;
use sea_query::extension::postgres::PgBinOper;
use sea_query::{
    Asterisk, Expr, Func, Iden, LikeExpr, PostgresQueryBuilder, SelectStatement, SimpleExpr,
    Value as SqlValue,
};
use serde::Deserialize;
use thiserror::Error;

/// Configuration for SQL generation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    /// Table selected from
    pub table: String,
    /// Maximum number of IN values before the list is split into OR'd chunks
    pub max_in_values: usize,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            table: "base_table".to_string(),
            max_in_values: 1000,
        }
    }
}

/// Table identifier for sea-query
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("lookup '{lookup}' on '{field}' has no SQL translation")]
    UnsupportedLookup { field: String, lookup: String },
    #[error("lookup '{lookup}' on '{field}' cannot take the value {value}")]
    InvalidValue {
        field: String,
        lookup: String,
        value: String,
    },
}

impl CompileError {
    fn invalid(term: &Term) -> Self {
        CompileError::InvalidValue {
            field: term.field.clone(),
            lookup: term.lookup.to_string(),
            value: term.value.to_string(),
        }
    }
}

/// Represents a rewrite applied during compilation
#[derive(Debug, Clone, PartialEq)]
pub enum Optimization {
    InToOrChunks {
        field: String,
        total_values: usize,
        chunk_count: usize,
    },
}

/// Result of SQL compilation with optimization information
#[derive(Debug)]
pub struct CompileResult {
    pub sql: String,
    pub optimizations: Vec<Optimization>,
}

/// SQL Compiler that converts predicates to SQL queries
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    config: SqlConfig,
}

impl SqlCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SqlConfig) -> Self {
        Self { config }
    }

    /// Compile an optional predicate into `SELECT * FROM table [WHERE ...]`.
    pub fn compile(&self, predicate: Option<&Predicate>) -> Result<CompileResult, CompileError> {
        let mut select = SelectStatement::new();
        select.from(TableName(self.config.table.clone())).column(Asterisk);

        let optimizations = match predicate {
            Some(predicate) => {
                let (condition, optimizations) = self.compile_predicate(predicate)?;
                select.and_where(condition);
                optimizations
            }
            None => Vec::new(),
        };

        Ok(CompileResult {
            sql: select.to_string(PostgresQueryBuilder),
            optimizations,
        })
    }

    /// Compile a predicate into a boolean expression, keeping its grouping.
    pub fn compile_predicate(
        &self,
        predicate: &Predicate,
    ) -> Result<(SimpleExpr, Vec<Optimization>), CompileError> {
        let mut optimizations = Vec::new();
        let expr = self.compile_expr(predicate, &mut optimizations)?;
        Ok((expr, optimizations))
    }

    fn compile_expr(
        &self,
        predicate: &Predicate,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<SimpleExpr, CompileError> {
        let expr = match predicate {
            Predicate::Term(term) => self.compile_term(term, optimizations)?,
            Predicate::And(left, right) => {
                let left = self.compile_expr(left, optimizations)?;
                let right = self.compile_expr(right, optimizations)?;
                left.and(right)
            }
            Predicate::Or(left, right) => {
                let left = self.compile_expr(left, optimizations)?;
                let right = self.compile_expr(right, optimizations)?;
                left.or(right)
            }
            Predicate::Not(inner) => self.compile_expr(inner, optimizations)?.not(),
        };
        Ok(expr)
    }

    /// Compile a single comparison
    fn compile_term(
        &self,
        term: &Term,
        optimizations: &mut Vec<Optimization>,
    ) -> Result<SimpleExpr, CompileError> {
        let col = || Expr::col(ColumnName(term.field.clone()));
        let lower_col = || Expr::expr(Func::lower(Expr::col(ColumnName(term.field.clone()))));

        let expr = match (&term.lookup, &term.value) {
            (Lookup::Exact, Value::Null) => col().is_null(),
            (Lookup::IsNull, Value::Bool(true)) => col().is_null(),
            (Lookup::IsNull, Value::Bool(false)) => col().is_not_null(),
            (Lookup::In, Value::List(items)) => self.compile_in(&term.field, items, optimizations),
            (Lookup::Range, Value::List(items)) if items.len() == 2 => {
                col().between(value_to_sql(&items[0]), value_to_sql(&items[1]))
            }
            (Lookup::Custom(_), _) => {
                return Err(CompileError::UnsupportedLookup {
                    field: term.field.clone(),
                    lookup: term.lookup.to_string(),
                })
            }
            (Lookup::IsNull | Lookup::In | Lookup::Range, _) | (_, Value::List(_) | Value::Null) => {
                return Err(CompileError::invalid(term))
            }
            (Lookup::Exact, value) => col().eq(value_to_sql(value)),
            (Lookup::IExact, value) => lower_col().eq(plain_text(value).to_lowercase()),
            (Lookup::Contains, value) => col().like(like(&plain_text(value), true, true)),
            (Lookup::IContains, value) => {
                lower_col().like(like(&plain_text(value).to_lowercase(), true, true))
            }
            (Lookup::StartsWith, value) => col().like(like(&plain_text(value), false, true)),
            (Lookup::IStartsWith, value) => {
                lower_col().like(like(&plain_text(value).to_lowercase(), false, true))
            }
            (Lookup::EndsWith, value) => col().like(like(&plain_text(value), true, false)),
            (Lookup::IEndsWith, value) => {
                lower_col().like(like(&plain_text(value).to_lowercase(), true, false))
            }
            (Lookup::Gt, value) => col().gt(value_to_sql(value)),
            (Lookup::Gte, value) => col().gte(value_to_sql(value)),
            (Lookup::Lt, value) => col().lt(value_to_sql(value)),
            (Lookup::Lte, value) => col().lte(value_to_sql(value)),
            (Lookup::Regex, value) => col().binary(PgBinOper::Regex, value_to_sql(value)),
            (Lookup::IRegex, value) => {
                col().binary(PgBinOper::RegexCaseInsensitive, value_to_sql(value))
            }
        };

        Ok(expr)
    }

    /// An empty IN list matches nothing; an oversized one is split into OR'd chunks.
    fn compile_in(
        &self,
        field: &str,
        items: &[Value],
        optimizations: &mut Vec<Optimization>,
    ) -> SimpleExpr {
        if items.is_empty() {
            return Expr::val(false).into();
        }

        let values: Vec<SqlValue> = items.iter().map(value_to_sql).collect();
        let max = self.config.max_in_values.max(1);
        if values.len() <= max {
            return Expr::col(ColumnName(field.to_string())).is_in(values);
        }

        let chunk_count = values.len().div_ceil(max);
        optimizations.push(Optimization::InToOrChunks {
            field: field.to_string(),
            total_values: values.len(),
            chunk_count,
        });
        values
            .chunks(max)
            .map(|chunk| Expr::col(ColumnName(field.to_string())).is_in(chunk.to_vec()))
            .reduce(SimpleExpr::or)
            .unwrap_or_else(|| Expr::val(false).into())
    }
}

/// Text used inside LIKE patterns and case-insensitive comparisons
fn plain_text(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string().trim_matches('\'').to_string(),
    }
}

fn like(text: &str, leading: bool, trailing: bool) -> LikeExpr {
    let mut pattern = String::with_capacity(text.len() + 2);
    if leading {
        pattern.push('%');
    }
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    if trailing {
        pattern.push('%');
    }
    LikeExpr::new(pattern).escape('\\')
}

/// Convert a filter value to a sea-query value
fn value_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::String(None),
        Value::Bool(b) => SqlValue::Bool(Some(*b)),
        Value::Int(n) => SqlValue::BigInt(Some(*n)),
        Value::Float(x) => SqlValue::Double(Some(*x)),
        Value::Decimal(d) => SqlValue::from(*d),
        Value::Text(s) => SqlValue::String(Some(Box::new(s.clone()))),
        Value::Date(d) => SqlValue::String(Some(Box::new(d.to_string()))),
        Value::Time(t) => SqlValue::String(Some(Box::new(t.to_string()))),
        Value::DateTime(dt) => SqlValue::String(Some(Box::new(dt.to_string()))),
        Value::List(_) => SqlValue::String(Some(Box::new(plain_text(value)))),
    }
}
