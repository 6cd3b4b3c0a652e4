use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The property set of a single object, keyed by property name.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// One typed property value.
///
/// Integers and timestamps keep their type through serialization so that
/// ordering by `extent` or `created` is numeric/chronological rather than
/// lexicographic.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Text(String),
    Integer(i64),
    Timestamp(DateTime<Utc>),
}

impl Scalar {
    fn rank(&self) -> u8 {
        match self {
            Scalar::Integer(_) => 0,
            Scalar::Timestamp(_) => 1,
            Scalar::Text(_) => 2,
        }
    }

    /// Loose equality used by search criteria: equal values, or values whose
    /// canonical text forms agree (`Integer(1024)` matches `Text("1024")`).
    pub fn matches(&self, expected: &Scalar) -> bool {
        self == expected || self.to_string() == expected.to_string()
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Integer(a), Scalar::Integer(b)) => a.cmp(b),
            (Scalar::Timestamp(a), Scalar::Timestamp(b)) => a.cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => f.write_str(s),
            Scalar::Integer(n) => write!(f, "{n}"),
            Scalar::Timestamp(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::Micros, true)),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Integer(n)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(t: DateTime<Utc>) -> Self {
        Scalar::Timestamp(t)
    }
}

/// A property value: a single scalar, or an ordered list of scalars when the
/// same key has been set more than once.
///
/// Serialized untagged: a single value as its scalar, a list as an array.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Single(Scalar),
    Multi(Vec<Scalar>),
}

impl PropertyValue {
    pub fn text(s: impl Into<String>) -> Self {
        PropertyValue::Single(Scalar::Text(s.into()))
    }

    pub fn integer(n: i64) -> Self {
        PropertyValue::Single(Scalar::Integer(n))
    }

    pub fn timestamp(t: DateTime<Utc>) -> Self {
        PropertyValue::Single(Scalar::Timestamp(t))
    }

    /// All scalars held by this value, in order.
    pub fn values(&self) -> &[Scalar] {
        match self {
            PropertyValue::Single(s) => std::slice::from_ref(s),
            PropertyValue::Multi(v) => v,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, PropertyValue::Multi(_))
    }

    /// Add another value. A `Single` is upgraded to a `Multi` holding the old
    /// value followed by the new one.
    pub fn push(&mut self, value: Scalar) {
        match self {
            PropertyValue::Multi(values) => values.push(value),
            PropertyValue::Single(existing) => {
                let first = std::mem::replace(existing, Scalar::Integer(0));
                *self = PropertyValue::Multi(vec![first, value]);
            }
        }
    }

    /// Criteria match: a `Single` expectation matches if any held scalar
    /// matches it; a `Multi` expectation must match element-wise.
    pub fn matches(&self, expected: &PropertyValue) -> bool {
        match expected {
            PropertyValue::Single(want) => self.values().iter().any(|v| v.matches(want)),
            PropertyValue::Multi(want) => {
                let have = self.values();
                have.len() == want.len() && have.iter().zip(want).all(|(h, w)| h.matches(w))
            }
        }
    }

    /// The single text value, if this is a `Single(Text)`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Single(s) => s.as_text(),
            PropertyValue::Multi(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Single(Scalar::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Single(Scalar::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }

    /// Convert a caller-supplied JSON value.
    ///
    /// Strings, numbers, and booleans become scalars; an array of those
    /// becomes a `Multi`. Objects and nulls are rejected.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, TypeError> {
        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(scalar_from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(PropertyValue::Multi),
            other => scalar_from_json(other).map(PropertyValue::Single),
        }
    }

    /// Render as plain JSON: text and timestamps as strings, integers as
    /// numbers, lists as arrays.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Single(s) => scalar_to_json(s),
            PropertyValue::Multi(v) => serde_json::Value::Array(v.iter().map(scalar_to_json).collect()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Single(s) => write!(f, "{s}"),
            PropertyValue::Multi(v) => {
                let parts: Vec<String> = v.iter().map(|s| s.to_string()).collect();
                f.write_str(&parts.join(", "))
            }
        }
    }
}

impl From<Scalar> for PropertyValue {
    fn from(value: Scalar) -> Self {
        PropertyValue::Single(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::text(s)
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::text(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::integer(n)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(t: DateTime<Utc>) -> Self {
        PropertyValue::timestamp(t)
    }
}

fn scalar_from_json(value: &serde_json::Value) -> Result<Scalar, TypeError> {
    match value {
        serde_json::Value::String(s) => Ok(Scalar::Text(s.clone())),
        serde_json::Value::Number(n) => Ok(match n.as_i64() {
            Some(i) => Scalar::Integer(i),
            None => Scalar::Text(n.to_string()),
        }),
        serde_json::Value::Bool(b) => Ok(Scalar::Text(b.to_string())),
        other => Err(TypeError::UnsupportedValue(other.to_string())),
    }
}

fn scalar_to_json(scalar: &Scalar) -> serde_json::Value {
    match scalar {
        Scalar::Integer(n) => serde_json::Value::from(*n),
        other => serde_json::Value::String(other.to_string()),
    }
}
