//! Raw rule-builder values and their normalization into predicate values.

use crate::attribute::ValueType;
use crate::operator::PredicateKind;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::fmt;

/// A single typed value inside a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }

    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Scalar::Text(s) => Cow::Borrowed(s.as_str()),
            Scalar::Int(n) => Cow::Owned(n.to_string()),
            Scalar::Float(f) => Cow::Owned(f.to_string()),
            Scalar::Bool(b) => Cow::Borrowed(if *b { "1" } else { "0" }),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Scalar::Text(s) if s.trim().is_empty())
    }

    /// Numeric reading of the value, accepting numeric strings.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Int(n) => Some(*n as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Text(s) => parse_number(s),
            Scalar::Bool(_) => None,
        }
    }

    /// Integer coercion for coded attributes; non-numeric values pass through.
    pub fn coerce_code(self) -> Self {
        match self {
            Scalar::Float(f) if f.is_finite() => Scalar::Int(f.trunc() as i64),
            Scalar::Text(s) => match parse_integer(&s) {
                Some(n) => Scalar::Int(n),
                None => Scalar::Text(s),
            },
            other => other,
        }
    }

    /// Truthiness of a yes/no selection such as `has_image`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Bool(b) => *b,
            Scalar::Int(n) => *n != 0,
            Scalar::Float(f) => *f != 0.0,
            Scalar::Text(s) => parse_integer(s).is_some_and(|n| n != 0),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Integer reading of a numeric string; fractional values are truncated.
fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| parse_number(s).map(|f| f.trunc() as i64))
}

/// A value exactly as the rule builder submitted it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    /// No value was submitted (`null` or `false`).
    #[default]
    Absent,
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl RawValue {
    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        RawValue::List(values.into_iter().map(Into::into).collect())
    }

    /// First scalar of the value.
    pub fn first(&self) -> Option<&Scalar> {
        match self {
            RawValue::Absent => None,
            RawValue::Scalar(s) => Some(s),
            RawValue::List(items) => items.first(),
        }
    }

    pub fn is_absent(&self) -> bool {
        match self {
            RawValue::Absent => true,
            RawValue::Scalar(s) => s.is_blank(),
            RawValue::List(items) => items.iter().all(Scalar::is_blank),
        }
    }

    /// Split into a token list regardless of the operator; scalar strings are
    /// split on `,` and `;`.
    pub fn to_list(&self) -> Vec<Scalar> {
        match self {
            RawValue::Absent => Vec::new(),
            RawValue::Scalar(Scalar::Text(s)) => split_tokens(s),
            RawValue::Scalar(s) => vec![s.clone()],
            RawValue::List(items) => items.iter().filter(|s| !s.is_blank()).cloned().collect(),
        }
    }
}

impl From<&JsonValue> for RawValue {
    fn from(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null | JsonValue::Bool(false) | JsonValue::Object(_) => RawValue::Absent,
            JsonValue::Array(items) => {
                RawValue::List(items.iter().filter_map(json_scalar).collect())
            }
            other => json_scalar(other).map_or(RawValue::Absent, RawValue::Scalar),
        }
    }
}

fn json_scalar(value: &JsonValue) -> Option<Scalar> {
    match value {
        JsonValue::Bool(b) => Some(Scalar::Bool(*b)),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Scalar::Int)
            .or_else(|| n.as_f64().map(Scalar::Float)),
        JsonValue::String(s) => Some(Scalar::Text(s.clone())),
        _ => None,
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Scalar(Scalar::from(value))
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Scalar(Scalar::Text(value))
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Scalar(Scalar::Int(value))
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        RawValue::Scalar(Scalar::from(value))
    }
}

impl From<Scalar> for RawValue {
    fn from(value: Scalar) -> Self {
        RawValue::Scalar(value)
    }
}

impl From<Vec<Scalar>> for RawValue {
    fn from(value: Vec<Scalar>) -> Self {
        RawValue::List(value)
    }
}

/// Normalized value carried by an atomic predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl PredicateValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            PredicateValue::Scalar(s) => Some(s),
            PredicateValue::List(items) => items.first(),
        }
    }

    pub fn as_slice(&self) -> &[Scalar] {
        match self {
            PredicateValue::Scalar(s) => std::slice::from_ref(s),
            PredicateValue::List(items) => items,
        }
    }
}

impl From<Scalar> for PredicateValue {
    fn from(value: Scalar) -> Self {
        PredicateValue::Scalar(value)
    }
}

impl From<Vec<Scalar>> for PredicateValue {
    fn from(value: Vec<Scalar>) -> Self {
        PredicateValue::List(value)
    }
}

/// Split a delimited string on `,`/`;`, trimming and dropping empty tokens.
pub fn split_tokens(input: &str) -> Vec<Scalar> {
    input
        .split([',', ';'])
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(Scalar::from)
        .collect()
}

/// Escape SQL wildcards and wrap the value for a substring match.
pub fn like_pattern(value: &Scalar) -> Scalar {
    let escaped = value.as_text().replace('%', "\\%").replace('_', "\\_");
    Scalar::Text(format!("%{escaped}%"))
}

/// Normalize a raw value for a predicate kind and attribute type.
///
/// Returns `None` when the condition has nothing to contribute.
pub fn normalize(raw: &RawValue, kind: PredicateKind, value_type: ValueType) -> Option<PredicateValue> {
    if raw.is_absent() {
        return None;
    }

    let value = if kind.is_array_valued() {
        let items = raw.to_list();
        if items.is_empty() {
            return None;
        }
        PredicateValue::List(items)
    } else {
        let first = raw.first().filter(|s| !s.is_blank())?;
        PredicateValue::Scalar(first.clone())
    };

    let value = if value_type.is_coded() {
        match value {
            PredicateValue::List(items) => {
                PredicateValue::List(items.into_iter().map(Scalar::coerce_code).collect())
            }
            PredicateValue::Scalar(s) => PredicateValue::Scalar(s.coerce_code()),
        }
    } else {
        value
    };

    if kind.is_pattern() {
        if let PredicateValue::Scalar(s) = &value {
            return Some(PredicateValue::Scalar(like_pattern(s)));
        }
    }

    Some(value)
}
