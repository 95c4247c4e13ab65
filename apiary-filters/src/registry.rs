//! Filter registry and filter-set evaluation

use crate::{builtin, Filter, FilterError};
use ahash::AHashMap;
use apiary_config::FilterConfig;
use apiary_schema::{normalize, Value, ValueMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// What a filter can see while it is evaluated
#[derive(Clone, Copy)]
pub struct FilterScope<'a> {
    /// Registry, for filters that compose other filters
    pub registry: &'a FilterRegistry,

    /// The full evaluation context (event options by name)
    pub context: &'a ValueMap,
}

/// Registry of named filters
///
/// Populated before start; lookups afterwards need no locking.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: AHashMap<String, Arc<dyn Filter>>,
}

impl FilterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in filter
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_builtins(&mut registry);
        registry
    }

    /// Register a filter under its own name, replacing any previous one
    pub fn register(&mut self, filter: Arc<dyn Filter>) {
        debug!(filter = filter.name(), "Registered filter");
        self.filters.insert(filter.name().to_string(), filter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered filters sorted by name
    pub fn filters(&self) -> Vec<Arc<dyn Filter>> {
        let mut filters: Vec<_> = self.filters.values().cloned().collect();
        filters.sort_by(|a, b| a.name().cmp(b.name()));
        filters
    }

    /// Evaluate a configured filter instance against a context
    ///
    /// Every option must pass; `inverse` flips the result of its own option only.
    pub fn evaluate(&self, config: &FilterConfig, context: &ValueMap) -> Result<bool, FilterError> {
        let filter = self
            .filters
            .get(&config.name)
            .ok_or_else(|| FilterError::NotFound(config.name.clone()))?;
        let scope = FilterScope {
            registry: self,
            context,
        };

        if config.options.is_empty() {
            return filter.passes(&scope, &Value::Null, &Value::Null);
        }

        for option in &config.options {
            let observed = if option.name.is_empty() {
                Value::Map(context.clone())
            } else {
                context.get(&option.name).cloned().unwrap_or_default()
            };
            let subject = normalize(&observed, option.trimmed, option.case_insensitive);
            let value = normalize(&option.value, option.trimmed, option.case_insensitive);

            let passed = filter.passes(&scope, &subject, &value)? != option.inverse;
            trace!(
                filter = %config.name,
                option = %option.name,
                passed,
                "Evaluated filter option"
            );
            if !passed {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FilterRegistry")
            .field("filters", &names)
            .finish()
    }
}
