//! Native schema language.
//!
//! A [`Rule`] is an immutable description of permitted shapes. Builders take
//! `self` by value and return a new rule, so deriving from a shared base
//! (`base.clone().keys(..)`) never changes the base.
//!
//! Evaluation is depth-first in declaration order: presence, allow list,
//! deny list, only list, base type (with coercion), type constraints,
//! declared keys, undeclared keys, then cross-field constraints.

use std::fmt;
use std::net::IpAddr;

use regex::Regex;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::engine::{Evaluate, Outcome};
use crate::error::{Detail, ValidationError};
use crate::options::ValidationOptions;

/// Key of the object form that stands for a callable in configuration
/// values: `{"$fn": "handlerName"}`.
pub const FUNC_REF_KEY: &str = "$fn";

/// Build a callable reference value.
pub fn func_ref(name: &str) -> Value {
    let mut map = Map::new();
    map.insert(FUNC_REF_KEY.to_string(), Value::String(name.to_string()));
    Value::Object(map)
}

/// Name of the callable if `value` is a callable reference.
pub fn func_ref_name(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(FUNC_REF_KEY)?.as_str(),
        _ => None,
    }
}

/// A value resolved at evaluation time rather than at rule construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Dotted path into [`ValidationOptions::context`].
    Context(String),
}

impl Reference {
    pub fn context(path: impl Into<String>) -> Self {
        Reference::Context(path.into())
    }

    fn resolve<'a>(&self, options: &'a ValidationOptions) -> Option<&'a Value> {
        match self {
            Reference::Context(path) => options.context_value(path),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Context(path) => write!(f, "context:{path}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Optional,
    Required,
}

#[derive(Debug, Clone)]
enum Allowed {
    Literal(Value),
    Ref(Reference),
}

impl fmt::Display for Allowed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Allowed::Literal(Value::String(s)) => f.write_str(s),
            Allowed::Literal(other) => write!(f, "{other}"),
            Allowed::Ref(reference) => write!(f, "{reference}"),
        }
    }
}

#[derive(Debug, Clone)]
enum Kind {
    Any,
    Boolean,
    Binary,
    Func,
    Number(NumberRule),
    String(StringRule),
    Object(ObjectRule),
    Array(ArrayRule),
    Alternatives(Vec<Rule>),
}

#[derive(Debug, Clone, Default)]
struct NumberRule {
    integer: bool,
    positive: bool,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct StringRule {
    regex: Option<Regex>,
    hostname: bool,
}

#[derive(Debug, Clone, Default)]
struct ArrayRule {
    includes: Vec<Rule>,
    min: Option<usize>,
    max: Option<usize>,
}

#[derive(Debug, Clone, Default)]
struct ObjectRule {
    /// `None` accepts any keys; `Some` declares them (possibly none).
    keys: Option<Vec<(String, Rule)>>,
    patterns: Vec<(Regex, Rule)>,
    unknown: Option<bool>,
    length: Option<usize>,
    constraints: Vec<Constraint>,
}

#[derive(Debug, Clone)]
enum Constraint {
    Or(Vec<String>),
    Xor(Vec<String>),
    Without(String, Vec<String>),
    With(String, Vec<String>),
}

/// Immutable, composable description of a permitted value shape.
#[derive(Debug, Clone)]
pub struct Rule {
    kind: Kind,
    presence: Presence,
    allowed: Vec<Allowed>,
    only: bool,
    invalid: Vec<Value>,
    default: Option<Value>,
}

impl Rule {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            presence: Presence::Optional,
            allowed: Vec::new(),
            only: false,
            invalid: Vec::new(),
            default: None,
        }
    }

    pub fn any() -> Self {
        Self::new(Kind::Any)
    }

    pub fn boolean() -> Self {
        Self::new(Kind::Boolean)
    }

    pub fn number() -> Self {
        Self::new(Kind::Number(NumberRule::default()))
    }

    /// Strings; the empty string is rejected unless explicitly allowed.
    pub fn string() -> Self {
        Self::new(Kind::String(StringRule::default()))
    }

    /// Byte arrays, or strings converted to bytes when converting.
    pub fn binary() -> Self {
        Self::new(Kind::Binary)
    }

    /// Callable references (see [`func_ref`]).
    pub fn func() -> Self {
        Self::new(Kind::Func)
    }

    /// Any object, any keys.
    pub fn object() -> Self {
        Self::new(Kind::Object(ObjectRule::default()))
    }

    /// Object with declared keys; other keys are rejected unless allowed.
    pub fn object_of<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = (K, Rule)>,
        K: Into<String>,
    {
        Self::new(Kind::Object(ObjectRule {
            keys: Some(keys.into_iter().map(|(k, r)| (k.into(), r)).collect()),
            ..ObjectRule::default()
        }))
    }

    /// Object declaring no keys; any key is rejected.
    pub fn empty_object() -> Self {
        Self::new(Kind::Object(ObjectRule {
            keys: Some(Vec::new()),
            ..ObjectRule::default()
        }))
    }

    pub fn array() -> Self {
        Self::new(Kind::Array(ArrayRule::default()))
    }

    /// Value must match at least one rule; the first match wins.
    pub fn alternatives<I: IntoIterator<Item = Rule>>(rules: I) -> Self {
        Self::new(Kind::Alternatives(rules.into_iter().collect()))
    }

    pub fn required(mut self) -> Self {
        self.presence = Presence::Required;
        self
    }

    pub fn optional(mut self) -> Self {
        self.presence = Presence::Optional;
        self
    }

    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }

    /// Accept `value` regardless of the rule's type.
    pub fn allow(mut self, value: impl Into<Value>) -> Self {
        self.allowed.push(Allowed::Literal(value.into()));
        self
    }

    pub fn allow_null(self) -> Self {
        self.allow(Value::Null)
    }

    /// Accept only the listed values (plus anything already allowed).
    pub fn valid<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed
            .extend(values.into_iter().map(|v| Allowed::Literal(v.into())));
        self.only = true;
        self
    }

    /// Accept only a value equal to the referenced context datum.
    pub fn valid_ref(mut self, reference: Reference) -> Self {
        self.allowed.push(Allowed::Ref(reference));
        self.only = true;
        self
    }

    pub fn invalid<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.invalid.extend(values.into_iter().map(Into::into));
        self
    }

    /// Value filled in for a missing key when converting.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Ignored unless the rule is a string.
    pub fn regex(mut self, regex: Regex) -> Self {
        if let Kind::String(rule) = &mut self.kind {
            rule.regex = Some(regex);
        }
        self
    }

    /// Ignored unless the rule is a string.
    pub fn hostname(mut self) -> Self {
        if let Kind::String(rule) = &mut self.kind {
            rule.hostname = true;
        }
        self
    }

    /// Ignored unless the rule is a number.
    pub fn integer(mut self) -> Self {
        if let Kind::Number(rule) = &mut self.kind {
            rule.integer = true;
        }
        self
    }

    /// Ignored unless the rule is a number.
    pub fn positive(mut self) -> Self {
        if let Kind::Number(rule) = &mut self.kind {
            rule.positive = true;
        }
        self
    }

    /// Inclusive lower bound. Ignored unless the rule is a number.
    pub fn min(mut self, limit: f64) -> Self {
        if let Kind::Number(rule) = &mut self.kind {
            rule.min = Some(limit);
        }
        self
    }

    /// Inclusive upper bound. Ignored unless the rule is a number.
    pub fn max(mut self, limit: f64) -> Self {
        if let Kind::Number(rule) = &mut self.kind {
            rule.max = Some(limit);
        }
        self
    }

    /// Every element must match at least one of `rules`.
    pub fn includes<I: IntoIterator<Item = Rule>>(mut self, rules: I) -> Self {
        if let Kind::Array(rule) = &mut self.kind {
            rule.includes.extend(rules);
        }
        self
    }

    pub fn min_items(mut self, limit: usize) -> Self {
        if let Kind::Array(rule) = &mut self.kind {
            rule.min = Some(limit);
        }
        self
    }

    pub fn max_items(mut self, limit: usize) -> Self {
        if let Kind::Array(rule) = &mut self.kind {
            rule.max = Some(limit);
        }
        self
    }

    /// Add or replace declared keys, returning the derived rule.
    pub fn keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = (K, Rule)>,
        K: Into<String>,
    {
        if let Kind::Object(rule) = &mut self.kind {
            let declared = rule.keys.get_or_insert_with(Vec::new);
            for (key, child) in keys {
                let key = key.into();
                match declared.iter_mut().find(|(name, _)| *name == key) {
                    Some(slot) => slot.1 = child,
                    None => declared.push((key, child)),
                }
            }
        }
        self
    }

    /// Undeclared keys matching `regex` are validated against `rule`.
    pub fn pattern_key(mut self, regex: Regex, child: Rule) -> Self {
        if let Kind::Object(rule) = &mut self.kind {
            rule.patterns.push((regex, child));
        }
        self
    }

    /// Override the `allow_unknown` option for this object only.
    pub fn unknown(mut self, allow: bool) -> Self {
        if let Kind::Object(rule) = &mut self.kind {
            rule.unknown = Some(allow);
        }
        self
    }

    /// Exact number of keys.
    pub fn length(mut self, count: usize) -> Self {
        if let Kind::Object(rule) = &mut self.kind {
            rule.length = Some(count);
        }
        self
    }

    /// At least one of `keys` must be present.
    pub fn or(self, keys: &[&str]) -> Self {
        self.constraint(Constraint::Or(owned(keys)))
    }

    /// Exactly one of `keys` must be present.
    pub fn xor(self, keys: &[&str]) -> Self {
        self.constraint(Constraint::Xor(owned(keys)))
    }

    /// `key` must not appear together with any of `peers`.
    pub fn without(self, key: &str, peers: &[&str]) -> Self {
        self.constraint(Constraint::Without(key.to_string(), owned(peers)))
    }

    /// When `key` is present, all of `peers` must be too.
    pub fn with(self, key: &str, peers: &[&str]) -> Self {
        self.constraint(Constraint::With(key.to_string(), owned(peers)))
    }

    fn constraint(mut self, constraint: Constraint) -> Self {
        if let Kind::Object(rule) = &mut self.kind {
            rule.constraints.push(constraint);
        }
        self
    }

    /// Declared key names of an object rule, in declaration order.
    pub fn declared_keys(&self) -> Vec<&str> {
        match &self.kind {
            Kind::Object(ObjectRule {
                keys: Some(keys), ..
            }) => keys.iter().map(|(name, _)| name.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Rule declared for `name`, if this is an object rule declaring it.
    pub fn key(&self, name: &str) -> Option<&Rule> {
        match &self.kind {
            Kind::Object(ObjectRule {
                keys: Some(keys), ..
            }) => keys.iter().find(|(key, _)| key == name).map(|(_, rule)| rule),
            _ => None,
        }
    }

    /// Short name of the rule's base type.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            Kind::Any => "any",
            Kind::Boolean => "boolean",
            Kind::Binary => "binary",
            Kind::Func => "func",
            Kind::Number(_) => "number",
            Kind::String(_) => "string",
            Kind::Object(_) => "object",
            Kind::Array(_) => "array",
            Kind::Alternatives(_) => "alternatives",
        }
    }

    fn check(&self, value: Option<&Value>, path: &[String], state: &mut State<'_>) -> Option<Value> {
        if state.halted() {
            return value.cloned();
        }

        let Some(value) = value else {
            if self.is_required() {
                state.fail(path, "is required");
                return None;
            }
            return match (&self.default, state.options.convert) {
                (Some(default), true) => Some(default.clone()),
                _ => None,
            };
        };

        if self.is_allowed(value, state.options) {
            return Some(value.clone());
        }
        if self.invalid.contains(value) {
            state.fail(path, "contains an invalid value");
            return Some(value.clone());
        }
        if self.only {
            let allowed = self
                .allowed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            state.fail(path, format!("must be one of {allowed}"));
            return Some(value.clone());
        }

        match &self.kind {
            Kind::Any => Some(value.clone()),
            Kind::Boolean => check_boolean(value, path, state),
            Kind::Binary => check_binary(value, path, state),
            Kind::Func => {
                if func_ref_name(value).is_none() {
                    state.fail(path, "must be a Function");
                }
                Some(value.clone())
            }
            Kind::Number(rule) => rule.check(value, path, state),
            Kind::String(rule) => rule.check(value, path, state),
            Kind::Object(rule) => rule.check(value, path, state),
            Kind::Array(rule) => rule.check(value, path, state),
            Kind::Alternatives(rules) => check_one_of(rules, value, path, state),
        }
    }

    fn is_allowed(&self, value: &Value, options: &ValidationOptions) -> bool {
        self.allowed.iter().any(|allowed| match allowed {
            Allowed::Literal(literal) => literal == value,
            Allowed::Ref(reference) => reference.resolve(options) == Some(value),
        })
    }

    /// Whether the value's JSON type is one this rule could ever accept.
    fn accepts_type(&self, value: &Value) -> bool {
        match (&self.kind, value) {
            (Kind::Any, _) => true,
            (Kind::Func, _) => func_ref_name(value).is_some(),
            (Kind::Object(_), Value::Object(_)) => func_ref_name(value).is_none(),
            (Kind::Alternatives(rules), _) => rules.iter().any(|rule| rule.accepts_type(value)),
            (Kind::Boolean, Value::Bool(_))
            | (Kind::Number(_), Value::Number(_))
            | (Kind::String(_), Value::String(_))
            | (Kind::Binary, Value::Array(_))
            | (Kind::Array(_), Value::Array(_)) => true,
            _ => false,
        }
    }
}

impl Evaluate for Rule {
    fn evaluate(&self, value: &Value, options: &ValidationOptions) -> Outcome {
        let mut state = State::new(options);
        let coerced = self.check(Some(value), &[], &mut state);
        if state.details.is_empty() {
            Ok(coerced)
        } else {
            Err(ValidationError::new(state.details).with_value(coerced))
        }
    }
}

struct State<'o> {
    options: &'o ValidationOptions,
    details: Vec<Detail>,
}

impl<'o> State<'o> {
    fn new(options: &'o ValidationOptions) -> Self {
        Self {
            options,
            details: Vec::new(),
        }
    }

    fn halted(&self) -> bool {
        self.options.abort_early && !self.details.is_empty()
    }

    fn fail(&mut self, path: &[String], message: impl fmt::Display) {
        if self.halted() {
            return;
        }
        let label = path.last().map(String::as_str).unwrap_or("value");
        let rendered = if path.is_empty() {
            "value".to_string()
        } else {
            path.join(".")
        };
        self.details
            .push(Detail::new(rendered, format!("\"{label}\" {message}")));
    }
}

fn child_path(path: &[String], segment: &str) -> Vec<String> {
    let mut child = path.to_vec();
    child.push(segment.to_string());
    child
}

fn owned(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

fn check_boolean(value: &Value, path: &[String], state: &mut State<'_>) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::String(s) if state.options.convert && (s == "true" || s == "false") => {
            Some(Value::Bool(s == "true"))
        }
        _ => {
            state.fail(path, "must be a boolean");
            Some(value.clone())
        }
    }
}

fn check_binary(value: &Value, path: &[String], state: &mut State<'_>) -> Option<Value> {
    match value {
        Value::Array(items) if items.iter().all(|b| b.as_u64().is_some_and(|b| b <= 255)) => {
            Some(value.clone())
        }
        Value::String(s) if state.options.convert => {
            Some(Value::Array(s.bytes().map(Value::from).collect()))
        }
        _ => {
            state.fail(path, "must be a buffer or a string");
            Some(value.clone())
        }
    }
}

impl NumberRule {
    fn check(&self, value: &Value, path: &[String], state: &mut State<'_>) -> Option<Value> {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) if state.options.convert => {
                s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
            }
            _ => None,
        };
        let Some(number) = parsed else {
            state.fail(path, "must be a number");
            return Some(value.clone());
        };

        if self.integer && number.fract() != 0.0 {
            state.fail(path, "must be an integer");
        }
        if let Some(min) = self.min {
            if number < min {
                state.fail(path, format!("must be larger than or equal to {min}"));
            }
        }
        if let Some(max) = self.max {
            if number > max {
                state.fail(path, format!("must be less than or equal to {max}"));
            }
        }
        if self.positive && number <= 0.0 {
            state.fail(path, "must be a positive number");
        }

        match value {
            Value::String(_) => Some(number_value(number)),
            _ => Some(value.clone()),
        }
    }
}

fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        Number::from_f64(number).map_or(Value::Null, Value::Number)
    }
}

impl StringRule {
    fn check(&self, value: &Value, path: &[String], state: &mut State<'_>) -> Option<Value> {
        let Value::String(s) = value else {
            state.fail(path, "must be a string");
            return Some(value.clone());
        };

        if s.is_empty() {
            state.fail(path, "is not allowed to be empty");
            return Some(value.clone());
        }
        if let Some(regex) = &self.regex {
            if !regex.is_match(s) {
                state.fail(
                    path,
                    format!("fails to match the required pattern: {}", regex.as_str()),
                );
            }
        }
        if self.hostname && !is_hostname(s) {
            state.fail(path, "must be a valid hostname");
        }
        Some(value.clone())
    }
}

fn is_hostname(candidate: &str) -> bool {
    if candidate.parse::<IpAddr>().is_ok() {
        return true;
    }
    if candidate.len() > 255 {
        return false;
    }
    candidate.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

impl ArrayRule {
    fn check(&self, value: &Value, path: &[String], state: &mut State<'_>) -> Option<Value> {
        let Value::Array(items) = value else {
            state.fail(path, "must be an array");
            return Some(value.clone());
        };

        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if self.includes.is_empty() {
                out.push(item.clone());
                continue;
            }
            let child = child_path(path, &index.to_string());
            if let Some(coerced) = check_one_of(&self.includes, item, &child, state) {
                out.push(coerced);
            }
        }

        if let Some(min) = self.min {
            if items.len() < min {
                state.fail(path, format!("must contain at least {min} items"));
            }
        }
        if let Some(max) = self.max {
            if items.len() > max {
                state.fail(path, format!("must contain less than or equal to {max} items"));
            }
        }
        Some(Value::Array(out))
    }
}

impl ObjectRule {
    fn check(&self, value: &Value, path: &[String], state: &mut State<'_>) -> Option<Value> {
        let Value::Object(map) = value else {
            state.fail(path, "must be an object");
            return Some(value.clone());
        };

        if let Some(length) = self.length {
            if map.len() != length {
                state.fail(path, format!("must have {length} children"));
            }
        }

        let out = if self.keys.is_none() && self.patterns.is_empty() {
            map.clone()
        } else {
            self.check_keys(map, path, state)
        };

        for constraint in &self.constraints {
            constraint.check(&out, path, state);
        }
        Some(Value::Object(out))
    }

    fn check_keys(
        &self,
        map: &Map<String, Value>,
        path: &[String],
        state: &mut State<'_>,
    ) -> Map<String, Value> {
        let declared = self.keys.as_deref().unwrap_or_default();
        let mut out = Map::new();

        for (key, rule) in declared {
            let child = child_path(path, key);
            if let Some(coerced) = rule.check(map.get(key), &child, state) {
                out.insert(key.clone(), coerced);
            }
        }

        let allow_unknown = self.unknown.unwrap_or(state.options.allow_unknown);
        for (key, item) in map {
            if declared.iter().any(|(name, _)| name == key) {
                continue;
            }
            let child = child_path(path, key);
            if let Some((_, rule)) = self.patterns.iter().find(|(regex, _)| regex.is_match(key)) {
                if let Some(coerced) = rule.check(Some(item), &child, state) {
                    out.insert(key.clone(), coerced);
                }
            } else if allow_unknown {
                out.insert(key.clone(), item.clone());
            } else if state.options.strip_unknown {
                debug!(key = %key, "stripping undeclared key");
            } else {
                state.fail(&child, "is not allowed");
                out.insert(key.clone(), item.clone());
            }
        }
        out
    }
}

impl Constraint {
    fn check(&self, map: &Map<String, Value>, path: &[String], state: &mut State<'_>) {
        match self {
            Constraint::Or(keys) => {
                if !keys.iter().any(|key| map.contains_key(key)) {
                    state.fail(
                        path,
                        format!("must contain at least one of [{}]", keys.join(", ")),
                    );
                }
            }
            Constraint::Xor(keys) => {
                let present = keys.iter().filter(|key| map.contains_key(*key)).count();
                if present == 0 {
                    state.fail(
                        path,
                        format!("must contain at least one of [{}]", keys.join(", ")),
                    );
                } else if present > 1 {
                    state.fail(
                        path,
                        format!(
                            "contains a conflict between exclusive peers [{}]",
                            keys.join(", ")
                        ),
                    );
                }
            }
            Constraint::Without(key, peers) => {
                if !map.contains_key(key) {
                    return;
                }
                for peer in peers.iter().filter(|peer| map.contains_key(*peer)) {
                    state.fail(
                        &child_path(path, key),
                        format!("conflict with forbidden peer \"{peer}\""),
                    );
                }
            }
            Constraint::With(key, peers) => {
                if !map.contains_key(key) {
                    return;
                }
                for peer in peers.iter().filter(|peer| !map.contains_key(*peer)) {
                    state.fail(
                        &child_path(path, key),
                        format!("missing required peer \"{peer}\""),
                    );
                }
            }
        }
    }
}

/// Shared by alternatives and array element matching.
///
/// When nothing matches and exactly one rule accepts the value's JSON type,
/// that rule's own violations are reported so nested paths survive.
fn check_one_of(
    rules: &[Rule],
    value: &Value,
    path: &[String],
    state: &mut State<'_>,
) -> Option<Value> {
    for rule in rules {
        let mut trial = State::new(state.options);
        let coerced = rule.check(Some(value), path, &mut trial);
        if trial.details.is_empty() {
            return coerced;
        }
    }

    let mut candidates = rules.iter().filter(|rule| rule.accepts_type(value));
    match (candidates.next(), candidates.next()) {
        (Some(rule), None) => rule.check(Some(value), path, state),
        _ => {
            state.fail(path, "does not match any of the allowed types");
            Some(value.clone())
        }
    }
}
