//! Leaf filters.
//!
//! A [`Filter`] owns one logical field: where to read it from (`sources`), what to
//! call it in the predicate (`dest`), which lookups may be used, and how to
//! validate it.
//!
//! ## Key resolution
//!
//! ```text
//! for source in sources:            (declaration order)
//!   for lookup in lookups:          (declaration order)
//!     key = source                  if lookup is exact
//!         = source__lookup          otherwise
//!     also accept bare `source`     if lookup is the only lookup
//!   first key present in input wins
//! ```
//!
//! A multi-valued lookup (`in`, `range`) then gathers every value under every
//! matching key. Keys whose suffix is not one of the filter's lookups are ignored.

use crate::errors::{ErrorMap, FilterError};
use crate::input::Input;
use crate::lookup::Lookup;
use crate::outcome::{FieldOutcome, ParseOutcome, Presence};
use crate::predicate::Predicate;
use crate::validator::{PassThrough, Validate};
use crate::value::Value;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct Filter {
    dest: String,
    sources: Vec<String>,
    lookups: Vec<Lookup>,
    required: bool,
    default: Option<Value>,
    default_lookup: Lookup,
    none_to_isnull: bool,
    negate: bool,
    validator: Arc<dyn Validate>,
}

impl Filter {
    /// A filter reading `dest` from the input key of the same name.
    pub fn new(dest: impl Into<String>) -> Self {
        let dest = dest.into();
        Self {
            sources: vec![dest.clone()],
            dest,
            lookups: vec![Lookup::Exact],
            required: false,
            default: None,
            default_lookup: Lookup::Exact,
            none_to_isnull: false,
            negate: false,
            validator: Arc::new(PassThrough),
        }
    }

    pub fn source(self, source: impl Into<String>) -> Self {
        self.sources([source])
    }

    /// Several source names, tried in order. An empty list keeps the current sources.
    pub fn sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();
        if !sources.is_empty() {
            self.sources = sources;
        }
        self
    }

    /// Permitted lookups. An empty list falls back to `exact`.
    pub fn lookups<I, L>(mut self, lookups: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Lookup>,
    {
        let mut unique: Vec<Lookup> = Vec::new();
        for lookup in lookups.into_iter().map(Into::into) {
            if !unique.contains(&lookup) {
                unique.push(lookup);
            }
        }
        if unique.is_empty() {
            unique.push(Lookup::Exact);
        }
        self.lookups = unique;
        self
    }

    /// Lookups given as a comma-separated string, e.g. `"gte,lte"`.
    pub fn lookups_csv(self, lookups: &str) -> Self {
        self.lookups(Lookup::parse_list(lookups))
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Value used when the input has none. [`Value::Null`] is a legitimate default.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn default_lookup(mut self, lookup: impl Into<Lookup>) -> Self {
        self.default_lookup = lookup.into();
        self
    }

    pub fn none_to_isnull(mut self, enabled: bool) -> Self {
        self.none_to_isnull = enabled;
        self
    }

    /// Inverts the sense of this filter's predicate.
    pub fn negate(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validate>) -> Self {
        self.validator = validator;
        self
    }

    pub fn validated_by<V: Validate + 'static>(self, validator: V) -> Self {
        self.validator(Arc::new(validator))
    }

    pub fn dest(&self) -> &str {
        &self.dest
    }

    pub fn sources_list(&self) -> &[String] {
        &self.sources
    }

    pub fn lookup_list(&self) -> &[Lookup] {
        &self.lookups
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Input keys that select `lookup` for `source`.
    fn keys_for(&self, source: &str, lookup: &Lookup) -> Vec<String> {
        let mut keys = vec![lookup.key_for(source)];
        if self.lookups.len() == 1 && *lookup != Lookup::Exact {
            keys.push(source.to_string());
        }
        keys
    }

    /// Finds the governing key and lookup, then reads its raw value.
    fn resolve(&self, input: &dyn Input) -> Option<(String, Lookup, Value)> {
        let (key, lookup) = self.sources.iter().find_map(|source| {
            self.lookups.iter().find_map(|lookup| {
                self.keys_for(source, lookup)
                    .into_iter()
                    .find(|key| input.contains_key(key))
                    .map(|key| (key, lookup.clone()))
            })
        })?;

        if !lookup.is_multi_valued() {
            let raw = input.get(&key)?;
            return Some((key, lookup, raw));
        }

        let values: Vec<Value> = self
            .sources
            .iter()
            .flat_map(|source| self.keys_for(source, &lookup))
            .filter_map(|k| input.get_list(&k))
            .flatten()
            .collect();
        Some((key, lookup, Value::List(values)))
    }

    fn build_predicate(&self, lookup: &Lookup, value: &Value) -> Predicate {
        if self.none_to_isnull && lookup.is_multi_valued() {
            if let Value::List(items) = value {
                if items.iter().any(Value::is_null) {
                    let rest: Vec<Value> = items.iter().filter(|v| !v.is_null()).cloned().collect();
                    let is_null = Predicate::term(&self.dest, Lookup::IsNull, true);
                    if rest.is_empty() {
                        return is_null;
                    }
                    return Predicate::term(&self.dest, lookup.clone(), Value::List(rest)).or(is_null);
                }
            }
        }
        Predicate::term(&self.dest, lookup.clone(), value.clone())
    }

    pub fn parse(&self, input: &dyn Input) -> ParseOutcome {
        let mut field = FieldOutcome {
            dest: self.dest.clone(),
            source: self.sources[0].clone(),
            key: None,
            presence: Presence::Absent,
            required: self.required,
            active_lookup: None,
            value: None,
            valid: true,
            excused: false,
        };
        let mut errors = ErrorMap::new();
        let mut predicate = None;

        if let Some((key, lookup, raw)) = self.resolve(input) {
            trace!(dest = %self.dest, key = %key, lookup = %lookup, "input key matched");
            field.presence = Presence::Provided;
            match self.validator.clean_all(&raw) {
                Ok(value) => {
                    predicate = Some(self.build_predicate(&lookup, &value));
                    field.value = Some(value);
                }
                Err(messages) => {
                    debug!(dest = %self.dest, key = %key, ?messages, "validation failed");
                    for message in messages {
                        errors.push(&self.dest, &FilterError::ValidationFailed(message));
                    }
                    field.valid = false;
                }
            }
            field.key = Some(key);
            field.active_lookup = Some(lookup);
        } else if let Some(default) = &self.default {
            trace!(dest = %self.dest, lookup = %self.default_lookup, "using default");
            field.presence = Presence::Defaulted;
            predicate = Some(self.build_predicate(&self.default_lookup, default));
            field.active_lookup = Some(self.default_lookup.clone());
            field.value = Some(default.clone());
        } else if self.required {
            errors.push(&self.dest, &FilterError::RequiredFieldMissing);
            field.valid = false;
        }

        let outcome = ParseOutcome {
            valid: field.valid,
            errors,
            predicate,
            fields: vec![field],
        };
        if self.negate {
            outcome.negated()
        } else {
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::QueryParams;
    use crate::validator::{Choice, Integer};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_source_defaults_to_dest() {
        let f = Filter::new("fieldname");
        assert_eq!(f.dest(), "fieldname");
        assert_eq!(f.sources_list(), ["fieldname"]);

        let f = Filter::new("fieldname").source("sourcename");
        assert_eq!(f.sources_list(), ["sourcename"]);
        assert_eq!(f.dest(), "fieldname");
    }

    #[test]
    fn test_explicit_lookup_suffix() {
        let f = Filter::new("x").lookups(["icontains", "contains"]);
        let outcome = f.parse(&HashMap::from([("x__icontains", "v")]));

        let field = outcome.field("x").unwrap();
        assert_eq!(field.active_lookup, Some(Lookup::IContains));
        assert_eq!(field.value, Some(Value::from("v")));
        assert_eq!(field.key.as_deref(), Some("x__icontains"));
        assert_eq!(
            outcome.predicate(),
            Some(&Predicate::term("x", Lookup::IContains, "v"))
        );
    }

    #[test]
    fn test_single_lookup_suffix_may_be_omitted() {
        let f = Filter::new("email").lookups(["iexact"]);
        let outcome = f.parse(&HashMap::from([("email", "v")]));
        assert_eq!(outcome.fields()[0].active_lookup, Some(Lookup::IExact));
        assert_eq!(
            outcome.predicate(),
            Some(&Predicate::term("email", Lookup::IExact, "v"))
        );
    }

    #[test]
    fn test_bare_key_needs_suffix_with_several_lookups() {
        let f = Filter::new("x").lookups(["icontains", "contains"]);
        let outcome = f.parse(&HashMap::from([("x", "v")]));
        assert!(outcome.valid());
        assert_eq!(outcome.predicate(), None);
        assert_eq!(outcome.fields()[0].presence, Presence::Absent);
    }

    #[test]
    fn test_undeclared_lookup_is_ignored() {
        let f = Filter::new("fieldname").required(true).lookups(["contains"]);
        let outcome = f.parse(&HashMap::from([("fieldname__gte", "foo"), ("fieldname__lte", "bar")]));
        assert!(!outcome.valid());
        assert_eq!(outcome.errors().get("fieldname").unwrap(), ["This field is required"]);
    }

    #[test]
    fn test_one_key_satisfies_required() {
        let f = Filter::new("fieldname").required(true).lookups(["gte"]);
        let outcome = f.parse(&HashMap::from([("fieldname__gte", "foo"), ("fieldname__lte", "bar")]));
        assert!(outcome.valid());
        assert!(outcome.errors().is_empty());
    }

    #[test]
    fn test_first_declared_lookup_governs() {
        let f = Filter::new("word").lookups(["gte", "gt", "lte", "lt"]);
        let outcome = f.parse(&HashMap::from([("word__lt", "4"), ("word__gt", "2")]));
        assert_eq!(outcome.predicate().unwrap().terms().len(), 1);
        assert_eq!(outcome.fields()[0].active_lookup, Some(Lookup::Gt));
    }

    #[test]
    fn test_required_missing() {
        let outcome = Filter::new("a").required(true).parse(&HashMap::<String, String>::new());
        assert!(!outcome.valid());
        assert_eq!(outcome.errors().get("a").unwrap(), ["This field is required"]);
        assert_eq!(outcome.predicate(), None);
    }

    #[test]
    fn test_optional_missing_has_no_predicate() {
        let outcome = Filter::new("a").parse(&HashMap::<String, String>::new());
        assert!(outcome.valid());
        assert!(outcome.errors().is_empty());
        assert_eq!(outcome.predicate(), None);
    }

    #[test]
    fn test_validation_errors_keyed_by_dest() {
        let f = Filter::new("age").source("min_age").lookups(["gte"]).validated_by(Integer);
        let outcome = f.parse(&HashMap::from([("min_age", "old")]));
        assert!(!outcome.valid());
        assert_eq!(outcome.errors().get("age").unwrap(), ["Enter a whole number."]);
        assert_eq!(outcome.predicate(), None);
        assert!(outcome.is_present());
    }

    #[test]
    fn test_coerced_value_in_predicate() {
        let f = Filter::new("age").lookups(["gte"]).validated_by(Integer);
        let outcome = f.parse(&HashMap::from([("age__gte", "21")]));
        assert_eq!(
            outcome.predicate(),
            Some(&Predicate::term("age", Lookup::Gte, 21))
        );
    }

    #[test]
    fn test_default_ignores_other_lookups() {
        let f = Filter::new("active")
            .lookups(["in", "isnull"])
            .with_default(true)
            .default_lookup("exact");
        let outcome = f.parse(&HashMap::<String, String>::new());
        assert!(outcome.valid());
        assert_eq!(
            outcome.predicate(),
            Some(&Predicate::term("active", Lookup::Exact, true))
        );
        let field = outcome.field("active").unwrap();
        assert_eq!(field.presence, Presence::Defaulted);
        assert!(!outcome.is_present());
    }

    #[test]
    fn test_null_default() {
        let f = Filter::new("groups").with_default(Value::Null);
        let outcome = f.parse(&HashMap::<String, String>::new());
        assert_eq!(
            outcome.predicate(),
            Some(&Predicate::term("groups", Lookup::Exact, Value::Null))
        );
    }

    #[test]
    fn test_none_to_isnull_splits_nulls() {
        let f = Filter::new("parent").lookups(["in"]).none_to_isnull(true);
        let outcome = f.parse(&json!({"parent__in": [1, null]}));
        let expected = Predicate::term("parent", Lookup::In, vec![1])
            .or(Predicate::term("parent", Lookup::IsNull, true));
        assert_eq!(outcome.predicate(), Some(&expected));
    }

    #[test]
    fn test_none_to_isnull_without_nulls() {
        let f = Filter::new("parent").lookups(["in"]).none_to_isnull(true);
        let outcome = f.parse(&json!({"parent__in": [1, 2]}));
        assert_eq!(
            outcome.predicate(),
            Some(&Predicate::term("parent", Lookup::In, vec![1, 2]))
        );
    }

    #[test]
    fn test_none_to_isnull_only_nulls() {
        let f = Filter::new("parent").lookups(["in"]).none_to_isnull(true);
        let outcome = f.parse(&json!({"parent": [null]}));
        assert_eq!(
            outcome.predicate(),
            Some(&Predicate::term("parent", Lookup::IsNull, true))
        );
    }

    #[test]
    fn test_multi_value_from_query_params() {
        let f = Filter::new("id").lookups(["in"]).validated_by(Integer);
        let outcome = f.parse(&QueryParams::parse("id__in=3&id__in=6&id=1"));
        assert_eq!(
            outcome.predicate(),
            Some(&Predicate::term("id", Lookup::In, vec![3, 6, 1]))
        );
    }

    #[test]
    fn test_single_value_lookup_takes_last_query_value() {
        let f = Filter::new("field");
        let outcome = f.parse(&QueryParams::parse("field=3&field=6"));
        assert_eq!(outcome.fields()[0].value, Some(Value::from("6")));
    }

    #[test]
    fn test_first_present_source_wins() {
        let f = Filter::new("name").sources(["nickname", "first_name"]);
        let outcome = f.parse(&HashMap::from([("first_name", "Bret"), ("nickname", "B")]));
        assert_eq!(outcome.fields()[0].key.as_deref(), Some("nickname"));

        let outcome = f.parse(&HashMap::from([("first_name", "Bret")]));
        assert_eq!(
            outcome.predicate(),
            Some(&Predicate::term("name", Lookup::Exact, "Bret"))
        );
    }

    #[test]
    fn test_negated_filter() {
        let f = Filter::new("status").negate();
        assert!(f.is_negated());
        assert!(!f.clone().negate().is_negated());
        let outcome = f.parse(&HashMap::from([("status", "closed")]));
        assert_eq!(
            outcome.predicate(),
            Some(&Predicate::term("status", Lookup::Exact, "closed").negate())
        );
    }

    #[test]
    fn test_lookups_csv_and_empty_fallback() {
        assert_eq!(
            Filter::new("f").lookups_csv("contains").lookup_list(),
            [Lookup::Contains]
        );
        assert_eq!(
            Filter::new("f").lookups(Vec::<String>::new()).lookup_list(),
            [Lookup::Exact]
        );
    }

    #[test]
    fn test_reparse_is_idempotent() {
        let f = Filter::new("name")
            .required(true)
            .validated_by(Choice { choices: vec!["alai".into()] });
        let data = HashMap::from([("name", "bean")]);
        assert_eq!(f.parse(&data), f.parse(&data));
        assert!(f.parse(&HashMap::from([("name", "alai")])).valid());
    }

    #[test]
    fn test_null_and_out_of_range_input_is_reported() {
        let f = Filter::new("age")
            .lookups(["gt"])
            .required(true)
            .validated_by(Integer);

        let outcome = f.parse(&json!({"age": null}));
        assert!(!outcome.valid());
        assert_eq!(outcome.predicate(), None);
        assert_eq!(outcome.errors().get("age").unwrap(), ["Enter a whole number."]);

        let outcome = f.parse(&json!({"age": 1e20}));
        assert!(!outcome.valid());
        assert_eq!(outcome.field("age").unwrap().value, None);
    }

    #[test]
    fn test_empty_query_element_reaches_none_to_isnull() {
        let f = Filter::new("parent")
            .lookups(["in"])
            .none_to_isnull(true)
            .validated_by(Integer);
        let outcome = f.parse(&QueryParams::parse("parent__in=1&parent__in="));
        assert!(outcome.valid());
        assert_eq!(
            outcome.into_predicate(),
            Some(
                Predicate::term("parent", Lookup::In, vec![1])
                    .or(Predicate::term("parent", Lookup::IsNull, true))
            )
        );
    }
}
