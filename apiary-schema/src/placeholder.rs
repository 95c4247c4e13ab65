//! Named, typed parameters carried by events and actions

use crate::{PlaceholderType, SchemaError, Value, ValueMap};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One named, typed parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placeholder {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: PlaceholderType,

    #[serde(default)]
    pub value: Value,
}

impl Placeholder {
    pub fn new(name: impl Into<String>, kind: PlaceholderType, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            value: value.into(),
        }
    }
}

/// Ordered placeholder collection with unique names
///
/// Deserializes through [`Placeholders::push`]: a repeated name keeps the first
/// position and the last value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Placeholders {
    #[serde(deserialize_with = "unique_placeholders")]
    items: SmallVec<[Placeholder; 8]>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(
        mut self,
        name: impl Into<String>,
        kind: PlaceholderType,
        value: impl Into<Value>,
    ) -> Self {
        self.set(name, kind, value);
        self
    }

    /// Set a value, replacing an existing placeholder of the same name in place
    pub fn set(&mut self, name: impl Into<String>, kind: PlaceholderType, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.items.iter_mut().find(|p| p.name == name) {
            Some(existing) => {
                existing.kind = kind;
                existing.value = value;
            }
            None => self.items.push(Placeholder { name, kind, value }),
        }
    }

    /// Insert a whole placeholder, keeping names unique
    pub fn push(&mut self, placeholder: Placeholder) {
        self.set(placeholder.name, placeholder.kind, placeholder.value);
    }

    /// Get a placeholder by name
    pub fn get(&self, name: &str) -> Option<&Placeholder> {
        self.items.iter().find(|p| p.name == name)
    }

    /// Get a placeholder value by name
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|p| &p.value)
    }

    /// Get a string value by name
    pub fn str_value(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Value::as_str)
    }

    /// Get a value that must exist and be of the given type
    pub fn require(&self, name: &str, kind: PlaceholderType) -> Result<&Value, SchemaError> {
        let value = self
            .value(name)
            .ok_or_else(|| SchemaError::PlaceholderNotFound(name.to_string()))?;
        if !kind.accepts(value) {
            return Err(SchemaError::TypeMismatch {
                name: name.to_string(),
                expected: kind.to_string(),
                actual: value.type_name().to_string(),
            });
        }
        Ok(value)
    }

    /// Check if a placeholder exists
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Placeholder> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Map of names to values, the evaluation context for chains and templates
    pub fn to_map(&self) -> ValueMap {
        self.items
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }
}

fn unique_placeholders<'de, D>(deserializer: D) -> Result<SmallVec<[Placeholder; 8]>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let items = Vec::<Placeholder>::deserialize(deserializer)?;
    Ok(items.into_iter().collect::<Placeholders>().items)
}

impl FromIterator<Placeholder> for Placeholders {
    fn from_iter<I: IntoIterator<Item = Placeholder>>(iter: I) -> Self {
        let mut placeholders = Placeholders::new();
        for placeholder in iter {
            placeholders.push(placeholder);
        }
        placeholders
    }
}

impl IntoIterator for Placeholders {
    type Item = Placeholder;
    type IntoIter = smallvec::IntoIter<[Placeholder; 8]>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Placeholders {
    type Item = &'a Placeholder;
    type IntoIter = std::slice::Iter<'a, Placeholder>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_in_place() {
        let mut placeholders = Placeholders::new()
            .with("a", PlaceholderType::String, "one")
            .with("b", PlaceholderType::Int, 2i64);

        placeholders.set("a", PlaceholderType::Int, 1i64);

        assert_eq!(placeholders.len(), 2);
        let first = placeholders.iter().next().unwrap();
        assert_eq!(first.name, "a");
        assert_eq!(first.value, Value::Int(1));
        assert_eq!(first.kind, PlaceholderType::Int);
    }

    #[test]
    fn test_from_iter_keeps_names_unique() {
        let placeholders: Placeholders = vec![
            Placeholder::new("x", PlaceholderType::String, "first"),
            Placeholder::new("x", PlaceholderType::String, "second"),
        ]
        .into_iter()
        .collect();

        assert_eq!(placeholders.len(), 1);
        assert_eq!(placeholders.str_value("x"), Some("second"));
    }

    #[test]
    fn test_require() {
        let placeholders = Placeholders::new().with("count", PlaceholderType::Int, 3i64);

        assert!(placeholders.require("count", PlaceholderType::Int).is_ok());
        assert!(matches!(
            placeholders.require("count", PlaceholderType::String),
            Err(SchemaError::TypeMismatch { .. })
        ));
        assert!(matches!(
            placeholders.require("missing", PlaceholderType::Int),
            Err(SchemaError::PlaceholderNotFound(_))
        ));
    }

    #[test]
    fn test_serde_shape() {
        let json = r#"[{"name": "text", "type": "string", "value": "hi"}, {"name": "n", "value": 4}]"#;
        let placeholders: Placeholders = serde_json::from_str(json).unwrap();

        assert_eq!(placeholders.str_value("text"), Some("hi"));
        assert_eq!(placeholders.value("n"), Some(&Value::Int(4)));
        assert_eq!(placeholders.get("n").unwrap().kind, PlaceholderType::String);

        let map = placeholders.to_map();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_deserialize_repeated_name_keeps_last_value() {
        let json = r#"[{"name": "a", "value": "1"}, {"name": "b", "value": 2}, {"name": "a", "value": "2"}]"#;
        let placeholders: Placeholders = serde_json::from_str(json).unwrap();

        assert_eq!(placeholders.len(), 2);
        assert_eq!(placeholders.str_value("a"), Some("2"));
        assert_eq!(placeholders.to_map().get("a"), Some(&Value::from("2")));
        assert_eq!(placeholders.iter().next().unwrap().name, "a");
    }
}
