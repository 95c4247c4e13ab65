//! Coercion of dynamically typed values into Rust types
//!
//! Used when binding bee options and action parameters. Conversions are lenient
//! where configuration files commonly disagree on representation (numbers given
//! as strings, lists given as comma separated strings) and strict otherwise: a
//! value that cannot be converted is reported instead of silently defaulted.

use crate::{Placeholders, SchemaError, Value};

/// Types that can be bound from a [`Value`]
pub trait FromValue: Sized {
    /// Type name used in mismatch diagnostics
    const EXPECTED: &'static str;

    /// Convert, returning `None` if the value has no sensible representation
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    const EXPECTED: &'static str = "any";

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::List(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(|parts| parts.join(",")),
            Value::Null | Value::Map(_) => None,
        }
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "bool";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "on" | "yes" | "1" | "t" => Some(true),
                "false" | "off" | "no" | "0" | "f" | "" => Some(false),
                _ => None,
            },
            Value::Int(v) => Some(*v > 0),
            Value::Float(v) => Some(*v > 0.0),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "int";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    const EXPECTED: &'static str = "int";

    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|v| i32::try_from(v).ok())
    }
}

impl FromValue for u64 {
    const EXPECTED: &'static str = "unsigned int";

    fn from_value(value: &Value) -> Option<Self> {
        i64::from_value(value).and_then(|v| u64::try_from(v).ok())
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "float";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for Vec<String> {
    const EXPECTED: &'static str = "list of strings";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect(),
            Value::String(s) if s.is_empty() => Some(Vec::new()),
            Value::String(s) => Some(s.split(',').map(str::to_string).collect()),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Convert a named value, reporting mismatches
pub fn convert<T: FromValue>(name: &str, value: &Value) -> Result<T, SchemaError> {
    T::from_value(value).ok_or_else(|| SchemaError::TypeMismatch {
        name: name.to_string(),
        expected: T::EXPECTED.to_string(),
        actual: value.type_name().to_string(),
    })
}

/// Apply trimming and then lowercasing to strings, recursively through lists
pub fn normalize(value: &Value, trimmed: bool, case_insensitive: bool) -> Value {
    if !trimmed && !case_insensitive {
        return value.clone();
    }
    match value {
        Value::String(s) => {
            let s = if trimmed { s.trim() } else { s.as_str() };
            if case_insensitive {
                Value::String(s.to_lowercase())
            } else {
                Value::String(s.to_string())
            }
        }
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| normalize(item, trimmed, case_insensitive))
                .collect(),
        ),
        other => other.clone(),
    }
}

impl Placeholders {
    /// Convert a placeholder value into `T`
    pub fn bind<T: FromValue>(&self, name: &str) -> Result<T, SchemaError> {
        let value = self
            .value(name)
            .ok_or_else(|| SchemaError::PlaceholderNotFound(name.to_string()))?;
        convert(name, value)
    }
}
