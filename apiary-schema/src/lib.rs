//! Apiary Value Schema
//!
//! This module defines the type system shared by events, actions, bee options and
//! filters. Every dynamically typed value flowing through the hive is a [`Value`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod convert;
pub mod descriptor;
pub mod placeholder;

pub use convert::{convert, normalize, FromValue};
pub use descriptor::{ActionDescriptor, EventDescriptor, OptionDescriptor, PlaceholderDescriptor};
pub use placeholder::{Placeholder, Placeholders};

/// String-keyed map of values (placeholder maps, template contexts)
pub type ValueMap = BTreeMap<String, Value>;

// ============================================================================
// Value
// ============================================================================

/// Dynamically typed value
///
/// Serialized untagged so configuration files read naturally:
/// `"text"`, `42`, `true`, `[1, 2]`, `{"k": "v"}` and `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    /// Name of the variant, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Get as string slice if possible
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as bool if possible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if possible
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as f64 if possible (integers widen)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as list if possible
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get as map if possible
    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness: null, false, zero, and empty strings or collections are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    /// Look up a key if this value is a map
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Element count for strings (bytes), lists and maps
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.len()),
            Value::List(items) => Some(items.len()),
            Value::Map(map) => Some(map.len()),
            _ => None,
        }
    }

    /// Convert into a `serde_json::Value`
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("map[")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}:{}", key, value)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(v) => Value::Int(v),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(Value::String).collect())
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(map)
    }
}

// ============================================================================
// Placeholder types
// ============================================================================

/// Declared type of a placeholder or option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderType {
    #[default]
    String,
    Int,
    Float,
    Bool,
    Url,
    Address,
    Timestamp,
    Map,
    List,
    Any,
}

impl PlaceholderType {
    /// Infer the placeholder type of a value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => PlaceholderType::Any,
            Value::Bool(_) => PlaceholderType::Bool,
            Value::Int(_) => PlaceholderType::Int,
            Value::Float(_) => PlaceholderType::Float,
            Value::String(_) => PlaceholderType::String,
            Value::List(_) => PlaceholderType::List,
            Value::Map(_) => PlaceholderType::Map,
        }
    }

    /// Whether a value is acceptable for this declared type
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (PlaceholderType::Any, _) | (_, Value::Null) => true,
            (PlaceholderType::String | PlaceholderType::Url | PlaceholderType::Address, v) => {
                matches!(v, Value::String(_))
            }
            (PlaceholderType::Int | PlaceholderType::Timestamp, v) => matches!(v, Value::Int(_)),
            (PlaceholderType::Float, v) => matches!(v, Value::Float(_) | Value::Int(_)),
            (PlaceholderType::Bool, v) => matches!(v, Value::Bool(_)),
            (PlaceholderType::List, v) => matches!(v, Value::List(_)),
            (PlaceholderType::Map, v) => matches!(v, Value::Map(_)),
        }
    }
}

impl fmt::Display for PlaceholderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaceholderType::String => "string",
            PlaceholderType::Int => "int",
            PlaceholderType::Float => "float",
            PlaceholderType::Bool => "bool",
            PlaceholderType::Url => "url",
            PlaceholderType::Address => "address",
            PlaceholderType::Timestamp => "timestamp",
            PlaceholderType::Map => "map",
            PlaceholderType::List => "list",
            PlaceholderType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Schema errors
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Placeholder not found: {0}")]
    PlaceholderNotFound(String),

    #[error("Type mismatch for {name}: expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_untagged_json() {
        let value: Value =
            serde_json::from_str(r#"{"a": 1, "b": "two", "c": [true, null], "d": 1.5}"#).unwrap();

        let map = value.as_map().unwrap();
        assert_eq!(map.get("a"), Some(&Value::Int(1)));
        assert_eq!(map.get("b"), Some(&Value::String("two".into())));
        assert_eq!(
            map.get("c"),
            Some(&Value::List(vec![Value::Bool(true), Value::Null]))
        );
        assert_eq!(map.get("d"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn test_value_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Float(2.0).to_string(), "2");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::from("a")]).to_string(),
            "[1 a]"
        );

        let mut map = ValueMap::new();
        map.insert("k".into(), Value::Bool(true));
        assert_eq!(Value::Map(map).to_string(), "map[k:true]");
    }

    #[test]
    fn test_placeholder_type_accepts() {
        assert!(PlaceholderType::Url.accepts(&Value::from("https://example.org")));
        assert!(PlaceholderType::Float.accepts(&Value::Int(3)));
        assert!(!PlaceholderType::Int.accepts(&Value::from("3")));
        assert!(PlaceholderType::Any.accepts(&Value::List(vec![])));
        assert_eq!(PlaceholderType::of(&Value::Bool(false)), PlaceholderType::Bool);
    }

    #[test]
    fn test_placeholder_type_serde() {
        let kind: PlaceholderType = serde_json::from_str(r#""address""#).unwrap();
        assert_eq!(kind, PlaceholderType::Address);
        assert_eq!(kind.to_string(), "address");
    }
}
