//! Validator adapters and the registry that maps field kinds onto them.
//!
//! A validator turns a raw value into a coerced one, or explains why it can't.
//! Field kinds (`"integer"`, `"date"`, ...) are table entries in a
//! [`ValidatorRegistry`]; adding a kind means registering a factory.

use crate::errors::TreeError;
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

pub type ValidationResult = Result<Value, Vec<String>>;

/// Coerces one raw scalar value.
pub trait Validate: Send + Sync + fmt::Debug {
    fn clean(&self, raw: &Value) -> ValidationResult;

    /// Cleans a scalar, or every element of a list. Null list elements are
    /// kept as-is; a null scalar goes through [`Validate::clean`].
    fn clean_all(&self, raw: &Value) -> ValidationResult {
        match raw {
            Value::List(items) => {
                let mut cleaned = Vec::with_capacity(items.len());
                let mut errors = Vec::new();
                for item in items {
                    if item.is_null() {
                        cleaned.push(Value::Null);
                        continue;
                    }
                    match self.clean(item) {
                        Ok(value) => cleaned.push(value),
                        Err(mut messages) => errors.append(&mut messages),
                    }
                }
                if errors.is_empty() {
                    Ok(Value::List(cleaned))
                } else {
                    Err(errors)
                }
            }
            scalar => self.clean(scalar),
        }
    }
}

fn invalid(message: impl Into<String>) -> ValidationResult {
    Err(vec![message.into()])
}

/// Text form of a scalar; lists and nulls have none.
fn scalar_text(raw: &Value) -> Option<String> {
    match raw {
        Value::Text(s) => Some(s.trim().to_string()),
        Value::Null | Value::List(_) => None,
        other => Some(other.to_string().trim_matches('\'').to_string()),
    }
}

/// Returns the raw value untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Validate for PassThrough {
    fn clean(&self, raw: &Value) -> ValidationResult {
        Ok(raw.clone())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Text;

impl Validate for Text {
    fn clean(&self, raw: &Value) -> ValidationResult {
        match scalar_text(raw) {
            Some(s) => Ok(Value::Text(s)),
            None => invalid("Enter a valid value."),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Integer;

impl Validate for Integer {
    fn clean(&self, raw: &Value) -> ValidationResult {
        match raw {
            Value::Int(n) => Ok(Value::Int(*n)),
            Value::Float(x) if x.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(x) => {
                Ok(Value::Int(*x as i64))
            }
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .or_else(|_| invalid("Enter a whole number.")),
            _ => invalid("Enter a whole number."),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Float;

impl Validate for Float {
    fn clean(&self, raw: &Value) -> ValidationResult {
        match raw {
            Value::Int(n) => Ok(Value::Float(*n as f64)),
            Value::Float(x) => Ok(Value::Float(*x)),
            Value::Text(s) => match s.trim().parse::<f64>() {
                Ok(x) if x.is_finite() => Ok(Value::Float(x)),
                _ => invalid("Enter a number."),
            },
            _ => invalid("Enter a number."),
        }
    }
}

/// Exact decimals, kept apart from binary floats.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decimal;

impl Validate for Decimal {
    fn clean(&self, raw: &Value) -> ValidationResult {
        let parsed = match raw {
            Value::Decimal(d) => Some(*d),
            Value::Int(n) => Some(rust_decimal::Decimal::from(*n)),
            Value::Float(x) => rust_decimal::Decimal::try_from(*x).ok(),
            Value::Text(s) => rust_decimal::Decimal::from_str(s.trim()).ok(),
            _ => None,
        };
        parsed
            .map(|d| Value::Decimal(d.normalize()))
            .map_or_else(|| invalid("Enter a number."), Ok)
    }
}

/// Booleans; with `nullable`, `null`/`none`/`unknown` coerce to [`Value::Null`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Boolean {
    pub nullable: bool,
}

impl Validate for Boolean {
    fn clean(&self, raw: &Value) -> ValidationResult {
        if let Value::Bool(b) = raw {
            return Ok(Value::Bool(*b));
        }
        let text = scalar_text(raw).unwrap_or_default().to_ascii_lowercase();
        match text.as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            "null" | "none" | "unknown" | "" if self.nullable => Ok(Value::Null),
            _ => invalid("Enter a valid boolean."),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Choice {
    pub choices: Vec<String>,
}

impl Validate for Choice {
    fn clean(&self, raw: &Value) -> ValidationResult {
        let Some(text) = scalar_text(raw) else {
            return invalid("Enter a valid value.");
        };
        if self.choices.iter().any(|c| *c == text) {
            Ok(Value::Text(text))
        } else {
            invalid(format!(
                "Select a valid choice. {} is not one of the available choices.",
                text
            ))
        }
    }
}

/// Several choices at once; a single value is treated as a one-element list.
#[derive(Debug, Clone, Default)]
pub struct MultipleChoice {
    pub choices: Vec<String>,
}

impl Validate for MultipleChoice {
    fn clean(&self, raw: &Value) -> ValidationResult {
        Choice {
            choices: self.choices.clone(),
        }
        .clean(raw)
    }

    fn clean_all(&self, raw: &Value) -> ValidationResult {
        let items = match raw {
            Value::List(items) => items.clone(),
            Value::Null => return invalid("Enter a list of values."),
            scalar => vec![scalar.clone()],
        };
        let mut cleaned = Vec::with_capacity(items.len());
        let mut errors = Vec::new();
        for item in &items {
            match self.clean(item) {
                Ok(value) => cleaned.push(value),
                Err(mut messages) => errors.append(&mut messages),
            }
        }
        if errors.is_empty() {
            Ok(Value::List(cleaned))
        } else {
            Err(errors)
        }
    }
}

/// Accepts text matching `regex`.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
        })
    }
}

impl Validate for Pattern {
    fn clean(&self, raw: &Value) -> ValidationResult {
        match scalar_text(raw) {
            Some(s) if self.regex.is_match(&s) => Ok(Value::Text(s)),
            _ => invalid("Enter a valid value."),
        }
    }
}

static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern compiles"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("email pattern compiles")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct Slug;

impl Validate for Slug {
    fn clean(&self, raw: &Value) -> ValidationResult {
        match scalar_text(raw) {
            Some(s) if SLUG.is_match(&s) => Ok(Value::Text(s)),
            _ => invalid(
                "Enter a valid slug consisting of letters, numbers, underscores or hyphens.",
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Email;

impl Validate for Email {
    fn clean(&self, raw: &Value) -> ValidationResult {
        match scalar_text(raw) {
            Some(s) if EMAIL.is_match(&s) => Ok(Value::Text(s)),
            _ => invalid("Enter a valid email address."),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Url;

impl Validate for Url {
    fn clean(&self, raw: &Value) -> ValidationResult {
        let parsed = scalar_text(raw).and_then(|s| url::Url::parse(&s).ok());
        match parsed {
            Some(u) if matches!(u.scheme(), "http" | "https" | "ftp" | "ftps") && u.has_host() => {
                Ok(Value::Text(u.to_string()))
            }
            _ => invalid("Enter a valid URL."),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IpAddress;

impl Validate for IpAddress {
    fn clean(&self, raw: &Value) -> ValidationResult {
        match scalar_text(raw).and_then(|s| s.parse::<IpAddr>().ok()) {
            Some(ip) => Ok(Value::Text(ip.to_string())),
            None => invalid("Enter a valid IPv4 or IPv6 address."),
        }
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M:%S%.f", "%H:%M"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Date;

impl Validate for Date {
    fn clean(&self, raw: &Value) -> ValidationResult {
        if let Value::Date(d) = raw {
            return Ok(Value::Date(*d));
        }
        let text = scalar_text(raw).unwrap_or_default();
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
            .map(Value::Date)
            .map_or_else(|| invalid("Enter a valid date."), Ok)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Time;

impl Validate for Time {
    fn clean(&self, raw: &Value) -> ValidationResult {
        if let Value::Time(t) = raw {
            return Ok(Value::Time(*t));
        }
        let text = scalar_text(raw).unwrap_or_default();
        TIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveTime::parse_from_str(&text, fmt).ok())
            .map(Value::Time)
            .map_or_else(|| invalid("Enter a valid time."), Ok)
    }
}

/// Date-times; RFC 3339 input is normalised to UTC, a bare date means midnight.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeKind;

impl Validate for DateTimeKind {
    fn clean(&self, raw: &Value) -> ValidationResult {
        match raw {
            Value::DateTime(dt) => return Ok(Value::DateTime(*dt)),
            Value::Date(d) => return Ok(Value::DateTime(d.and_time(NaiveTime::MIN))),
            _ => {}
        }
        let text = scalar_text(raw).unwrap_or_default();
        let parsed = DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.naive_utc())
            .ok()
            .or_else(|| {
                DATETIME_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(&text, fmt).ok())
            })
            .or_else(|| {
                NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .ok()
                    .map(|d| d.and_time(NaiveTime::MIN))
            });
        parsed
            .map(Value::DateTime)
            .map_or_else(|| invalid("Enter a valid date/time."), Ok)
    }
}

/// Adapts a closure into a validator.
pub struct FnValidator<F>(pub F);

impl<F> fmt::Debug for FnValidator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnValidator")
    }
}

impl<F> Validate for FnValidator<F>
where
    F: Fn(&Value) -> ValidationResult + Send + Sync,
{
    fn clean(&self, raw: &Value) -> ValidationResult {
        (self.0)(raw)
    }
}

/// Per-kind parameters a factory may need.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KindOptions {
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub pattern: Option<String>,
}

type Factory = Arc<dyn Fn(&KindOptions) -> Result<Arc<dyn Validate>, String> + Send + Sync>;

/// Table of validator factories keyed by field-kind tag.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    factories: HashMap<String, Factory>,
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ValidatorRegistry").field("kinds", &kinds).finish()
    }
}

impl ValidatorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in kind.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_unit("any", PassThrough);
        registry.register_unit("text", Text);
        registry.register_unit("integer", Integer);
        registry.register_unit("float", Float);
        registry.register_unit("decimal", Decimal);
        registry.register_unit("boolean", Boolean { nullable: false });
        registry.register_unit("null_boolean", Boolean { nullable: true });
        registry.register_unit("slug", Slug);
        registry.register_unit("email", Email);
        registry.register_unit("url", Url);
        registry.register_unit("ip_address", IpAddress);
        registry.register_unit("date", Date);
        registry.register_unit("time", Time);
        registry.register_unit("datetime", DateTimeKind);
        registry.register("choice", |opts: &KindOptions| {
            if opts.choices.is_empty() {
                return Err("no choices given".to_string());
            }
            Ok(Arc::new(Choice {
                choices: opts.choices.clone(),
            }) as Arc<dyn Validate>)
        });
        registry.register("multiple_choice", |opts: &KindOptions| {
            if opts.choices.is_empty() {
                return Err("no choices given".to_string());
            }
            Ok(Arc::new(MultipleChoice {
                choices: opts.choices.clone(),
            }) as Arc<dyn Validate>)
        });
        registry.register("regex", |opts: &KindOptions| {
            let pattern = opts.pattern.as_deref().ok_or("no pattern given")?;
            let validator = Pattern::new(pattern).map_err(|e| e.to_string())?;
            Ok(Arc::new(validator) as Arc<dyn Validate>)
        });
        registry
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&KindOptions) -> Result<Arc<dyn Validate>, String> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    /// Registers a kind that takes no options.
    pub fn register_unit<V>(&mut self, kind: impl Into<String>, validator: V)
    where
        V: Validate + 'static,
    {
        let shared: Arc<dyn Validate> = Arc::new(validator);
        self.register(kind, move |_: &KindOptions| Ok(Arc::clone(&shared)));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn resolve(&self, kind: &str, options: &KindOptions) -> Result<Arc<dyn Validate>, TreeError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| TreeError::UnknownKind(kind.to_string()))?;
        factory(options).map_err(|reason| TreeError::InvalidKind {
            kind: kind.to_string(),
            reason,
        })
    }
}
