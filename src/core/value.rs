//! Attribute values for structured logging
//!
//! Attribute values are a closed set of kinds so that every encoder
//! (logfmt, JSON, Loki, OTLP) can handle them exhaustively. Anything else is
//! coerced to its string form with [`FieldValue::display`] or
//! [`FieldValue::debug`] instead of being rejected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value type for structured logging fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Map(BTreeMap<String, FieldValue>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Uint(u) => write!(f, "{}", u),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Map(_) => write!(f, "{}", self.to_json_value()),
        }
    }
}

impl FieldValue {
    /// Coerce any displayable value into a string field
    pub fn display(value: impl fmt::Display) -> Self {
        FieldValue::String(value.to_string())
    }

    /// Coerce any debuggable value into a string field
    pub fn debug(value: impl fmt::Debug) -> Self {
        FieldValue::String(format!("{:?}", value))
    }

    /// Returns the string payload when this is a string value
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to serde_json::Value for JSON serialization
    ///
    /// Non-finite floats have no JSON number form and are emitted as strings.
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
            FieldValue::Int(i) => serde_json::Value::Number((*i).into()),
            FieldValue::Uint(u) => serde_json::Value::Number((*u).into()),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(f.to_string())),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json_value()))
                    .collect(),
            ),
        }
    }

    /// Flatten into `(key, scalar)` pairs, expanding nested maps into dotted keys
    pub fn flatten_into(&self, key: &str, out: &mut Vec<(String, FieldValue)>) {
        match self {
            FieldValue::Map(map) if !map.is_empty() => {
                for (k, v) in map {
                    v.flatten_into(&format!("{}.{}", key, k), out);
                }
            }
            FieldValue::Map(_) => out.push((key.to_string(), FieldValue::String("{}".into()))),
            scalar => out.push((key.to_string(), scalar.clone())),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<&String> for FieldValue {
    fn from(s: &String) -> Self {
        FieldValue::String(s.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i64::from(i))
    }
}

impl From<u64> for FieldValue {
    fn from(u: u64) -> Self {
        FieldValue::Uint(u)
    }
}

impl From<u32> for FieldValue {
    fn from(u: u32) -> Self {
        FieldValue::Uint(u64::from(u))
    }
}

impl From<usize> for FieldValue {
    fn from(u: usize) -> Self {
        FieldValue::Uint(u as u64)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<f32> for FieldValue {
    fn from(f: f32) -> Self {
        FieldValue::Float(f64::from(f))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<BTreeMap<String, FieldValue>> for FieldValue {
    fn from(map: BTreeMap<String, FieldValue>) -> Self {
        FieldValue::Map(map)
    }
}

impl From<std::time::Duration> for FieldValue {
    fn from(d: std::time::Duration) -> Self {
        FieldValue::String(format!("{:?}", d))
    }
}

/// A single key/value pair attached to a record or handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: FieldValue,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Shorthand for [`Attribute::new`]
pub fn attr(key: impl Into<String>, value: impl Into<FieldValue>) -> Attribute {
    Attribute::new(key, value)
}

impl<K, V> From<(K, V)> for Attribute
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from((key, value): (K, V)) -> Self {
        Attribute::new(key, value)
    }
}
