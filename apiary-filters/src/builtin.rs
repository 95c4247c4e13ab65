//! Built-in filters

use crate::{Filter, FilterError, FilterRegistry, FilterScope};
use ahash::AHashMap;
use apiary_config::{FilterConfig, FilterSpec};
use apiary_schema::Value;
use apiary_template::{expand_test_directive, Template};
use parking_lot::RwLock;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Register every built-in filter
pub fn register_builtins(registry: &mut FilterRegistry) {
    registry.register(Arc::new(EqualsFilter));
    registry.register(Arc::new(StartsWithFilter));
    registry.register(Arc::new(EndsWithFilter));
    registry.register(Arc::new(ContainsFilter));
    registry.register(Arc::new(MatchesFilter::default()));
    registry.register(Arc::new(TemplateFilter::default()));
    registry.register(Arc::new(BooleanFilter));
    #[cfg(feature = "starlark")]
    registry.register(Arc::new(StarlarkFilter::default()));
    #[cfg(feature = "lua")]
    registry.register(Arc::new(LuaFilter::default()));
}

// ============================================================================
// String predicates
// ============================================================================

/// Passes when subject and value are equal strings, booleans or numbers
pub struct EqualsFilter;

impl Filter for EqualsFilter {
    fn name(&self) -> &str {
        "equals"
    }

    fn description(&self) -> &str {
        "This filter passes when a placeholder equals a specific value"
    }

    fn passes(&self, _: &FilterScope<'_>, subject: &Value, value: &Value) -> Result<bool, FilterError> {
        Ok(match (subject, value) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                subject.as_f64() == value.as_f64()
            }
            _ => false,
        })
    }
}

/// Passes when a string subject starts with the value
pub struct StartsWithFilter;

impl Filter for StartsWithFilter {
    fn name(&self) -> &str {
        "startswith"
    }

    fn description(&self) -> &str {
        "This filter passes when a placeholder starts with a specific string"
    }

    fn passes(&self, _: &FilterScope<'_>, subject: &Value, value: &Value) -> Result<bool, FilterError> {
        Ok(match (subject, value) {
            (Value::String(s), Value::String(prefix)) => s.starts_with(prefix.as_str()),
            _ => false,
        })
    }
}

/// Passes when a string subject ends with the value
pub struct EndsWithFilter;

impl Filter for EndsWithFilter {
    fn name(&self) -> &str {
        "endswith"
    }

    fn description(&self) -> &str {
        "This filter passes when a placeholder ends with a specific string"
    }

    fn passes(&self, _: &FilterScope<'_>, subject: &Value, value: &Value) -> Result<bool, FilterError> {
        Ok(match (subject, value) {
            (Value::String(s), Value::String(suffix)) => s.ends_with(suffix.as_str()),
            _ => false,
        })
    }
}

/// Passes when a string subject contains the value, or a list subject has it as element
pub struct ContainsFilter;

impl Filter for ContainsFilter {
    fn name(&self) -> &str {
        "contains"
    }

    fn description(&self) -> &str {
        "This filter passes when a placeholder contains a specific thing"
    }

    fn passes(&self, _: &FilterScope<'_>, subject: &Value, value: &Value) -> Result<bool, FilterError> {
        Ok(match (subject, value) {
            (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
            (Value::List(items), Value::String(_)) => items.contains(value),
            _ => false,
        })
    }
}

/// Passes when the value, a regular expression, matches anywhere in a string subject
#[derive(Default)]
pub struct MatchesFilter {
    cache: RwLock<AHashMap<String, Regex>>,
}

impl MatchesFilter {
    fn regex(&self, pattern: &str) -> Result<Regex, FilterError> {
        if let Some(regex) = self.cache.read().get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern).map_err(|e| FilterError::Regex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.cache.write().insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

impl Filter for MatchesFilter {
    fn name(&self) -> &str {
        "matches"
    }

    fn description(&self) -> &str {
        "This filter passes when a placeholder matches a regular expression"
    }

    fn passes(&self, _: &FilterScope<'_>, subject: &Value, value: &Value) -> Result<bool, FilterError> {
        let pattern = value
            .as_str()
            .ok_or_else(|| FilterError::invalid_value(self.name(), "pattern must be a string"))?;
        // Compile first so a bad pattern is reported even for non-string subjects
        let regex = self.regex(pattern)?;
        Ok(subject.as_str().is_some_and(|s| regex.is_match(s)))
    }
}

// ============================================================================
// Template
// ============================================================================

/// Passes when the value, a template rendered against the subject, yields `true`
#[derive(Default)]
pub struct TemplateFilter {
    cache: RwLock<AHashMap<String, Arc<Template>>>,
}

impl TemplateFilter {
    fn template(&self, source: &str) -> Result<Arc<Template>, FilterError> {
        if let Some(template) = self.cache.read().get(source) {
            return Ok(template.clone());
        }
        let expanded = expand_test_directive(source);
        let template = Arc::new(Template::parse("filter", &*expanded)?);
        self.cache
            .write()
            .insert(source.to_string(), template.clone());
        Ok(template)
    }
}

impl Filter for TemplateFilter {
    fn name(&self) -> &str {
        "template"
    }

    fn description(&self) -> &str {
        "This filter passes when a template renders to true"
    }

    fn passes(&self, _: &FilterScope<'_>, subject: &Value, value: &Value) -> Result<bool, FilterError> {
        let source = value
            .as_str()
            .ok_or_else(|| FilterError::invalid_value(self.name(), "template must be a string"))?;
        let rendered = self.template(source)?.render(subject)?;
        Ok(rendered.trim() == "true")
    }
}

// ============================================================================
// Scripts
// ============================================================================

/// Passes when the value, a Starlark script, returns a truthy value from `main`
///
/// Every context entry is passed to `main` as a keyword argument.
#[cfg(feature = "starlark")]
#[derive(Default)]
pub struct StarlarkFilter {
    engine: apiary_runtime_starlark::StarlarkEngine,
}

#[cfg(feature = "starlark")]
impl Filter for StarlarkFilter {
    fn name(&self) -> &str {
        apiary_config::STARLARK_FILTER
    }

    fn description(&self) -> &str {
        "This filter passes when a Starlark script's main function returns True"
    }

    fn passes(&self, scope: &FilterScope<'_>, _subject: &Value, value: &Value) -> Result<bool, FilterError> {
        let script = value
            .as_str()
            .ok_or_else(|| FilterError::invalid_value(self.name(), "script must be a string"))?;
        Ok(self.engine.evaluate("filter", script, scope.context)?)
    }
}

/// Passes when the value, a Lua script, returns a truthy value from `main(args)`
///
/// `args` holds the whole event context.
#[cfg(feature = "lua")]
#[derive(Default)]
pub struct LuaFilter {
    engine: apiary_runtime_lua::LuaEngine,
}

#[cfg(feature = "lua")]
impl LuaFilter {
    pub fn new(config: apiary_runtime_lua::LuaConfig) -> Self {
        Self {
            engine: apiary_runtime_lua::LuaEngine::new(config),
        }
    }
}

#[cfg(feature = "lua")]
impl Filter for LuaFilter {
    fn name(&self) -> &str {
        apiary_config::LUA_FILTER
    }

    fn description(&self) -> &str {
        "This filter passes when a Lua script's main function returns true"
    }

    fn passes(&self, scope: &FilterScope<'_>, _subject: &Value, value: &Value) -> Result<bool, FilterError> {
        let script = value
            .as_str()
            .ok_or_else(|| FilterError::invalid_value(self.name(), "script must be a string"))?;
        Ok(self.engine.evaluate("filter", script, scope.context)?)
    }
}

// ============================================================================
// Boolean
// ============================================================================

/// Boolean combination of sub-filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOperation {
    And,
    Or,
    Xor,
    Not,
}

impl BooleanOperation {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "and" => Some(BooleanOperation::And),
            "or" => Some(BooleanOperation::Or),
            "xor" => Some(BooleanOperation::Xor),
            "not" => Some(BooleanOperation::Not),
            _ => None,
        }
    }
}

/// Composes sub-filters given as `{operation, filters}` in the value
pub struct BooleanFilter;

impl BooleanFilter {
    fn sub_filters(&self, value: &Value) -> Result<Vec<FilterConfig>, FilterError> {
        let items = match value.get("filters") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::List(items)) => items,
            Some(other) => {
                return Err(FilterError::invalid_value(
                    self.name(),
                    format!("filters must be a list, got {}", other.type_name()),
                ))
            }
        };

        items
            .iter()
            .map(|item| {
                serde_json::from_value::<FilterSpec>(item.to_json())
                    .map(|spec| spec.to_config())
                    .map_err(|e| FilterError::invalid_value(self.name(), e.to_string()))
            })
            .collect()
    }
}

impl Filter for BooleanFilter {
    fn name(&self) -> &str {
        "boolean"
    }

    fn description(&self) -> &str {
        "This filter allows boolean operations on 1 (NOT) or more (AND, OR, XOR) filters"
    }

    fn passes(&self, scope: &FilterScope<'_>, _subject: &Value, value: &Value) -> Result<bool, FilterError> {
        let filters = self.sub_filters(value)?;
        if filters.is_empty() {
            debug!("Boolean filter without sub-filters");
            return Ok(false);
        }

        let operation_name = value
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| FilterError::invalid_value(self.name(), "missing operation"))?;
        let operation = BooleanOperation::parse(operation_name).ok_or_else(|| {
            FilterError::invalid_value(self.name(), format!("unknown operation {}", operation_name))
        })?;

        let registry = scope.registry;
        let context = scope.context;

        match operation {
            BooleanOperation::And => {
                for filter in &filters {
                    if !registry.evaluate(filter, context)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            BooleanOperation::Or => {
                for filter in &filters {
                    if registry.evaluate(filter, context)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            BooleanOperation::Xor => {
                let mut passed = false;
                for filter in &filters {
                    if registry.evaluate(filter, context)? {
                        if passed {
                            return Ok(false);
                        }
                        passed = true;
                    }
                }
                Ok(passed)
            }
            BooleanOperation::Not => match filters.as_slice() {
                [single] => Ok(!registry.evaluate(single, context)?),
                _ => Err(FilterError::invalid_value(
                    self.name(),
                    format!("not expects exactly one filter, got {}", filters.len()),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiary_schema::ValueMap;

    fn check(filter: &dyn Filter, subject: impl Into<Value>, value: impl Into<Value>) -> bool {
        let registry = FilterRegistry::new();
        let context = ValueMap::new();
        let scope = FilterScope {
            registry: &registry,
            context: &context,
        };
        filter
            .passes(&scope, &subject.into(), &value.into())
            .unwrap()
    }

    #[test]
    fn test_equals() {
        assert!(check(&EqualsFilter, "foo", "foo"));
        assert!(!check(&EqualsFilter, "foo", "bar"));
        assert!(check(&EqualsFilter, true, true));
        assert!(check(&EqualsFilter, 2i64, 2.0));
        assert!(!check(&EqualsFilter, "1", 1i64));
    }

    #[test]
    fn test_prefix_suffix_contains() {
        assert!(check(&StartsWithFilter, "hello world", "hello"));
        assert!(!check(&StartsWithFilter, "hello world", "world"));
        assert!(!check(&StartsWithFilter, 12i64, "1"));
        assert!(check(&EndsWithFilter, "hello world", "world"));
        assert!(check(&ContainsFilter, "hello world", "lo w"));
        assert!(!check(&ContainsFilter, "hello world", "xyz"));
        assert!(check(
            &ContainsFilter,
            Value::from(vec!["a".to_string(), "b".to_string()]),
            "b"
        ));
    }

    #[test]
    fn test_matches_and_invalid_pattern() {
        let filter = MatchesFilter::default();
        assert!(check(&filter, "order 66", r"\d+"));
        assert!(!check(&filter, "no digits", r"\d+"));

        let registry = FilterRegistry::new();
        let context = ValueMap::new();
        let scope = FilterScope {
            registry: &registry,
            context: &context,
        };
        assert!(matches!(
            filter.passes(&scope, &Value::from("x"), &Value::from("(")),
            Err(FilterError::Regex { .. })
        ));
    }

    #[test]
    fn test_template_filter() {
        let filter = TemplateFilter::default();
        let subject = Value::from(serde_json::json!({"text": "good", "n": 3}));

        assert!(check(&filter, subject.clone(), r#"{{test eq .text "good"}}"#));
        assert!(!check(&filter, subject.clone(), r#"{{test eq .text "bad"}}"#));
        assert!(check(&filter, subject.clone(), "{{if gt .n 2}} true {{end}}"));
        assert!(!check(&filter, subject, "yes"));
    }

    #[test]
    fn test_boolean_operation_parse() {
        assert_eq!(BooleanOperation::parse("AND"), Some(BooleanOperation::And));
        assert_eq!(BooleanOperation::parse("xor"), Some(BooleanOperation::Xor));
        assert_eq!(BooleanOperation::parse("nand"), None);
    }
}
