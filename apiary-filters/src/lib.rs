//! Apiary Filters
//!
//! Named predicates that gate chain execution. A [`FilterRegistry`] is populated
//! once at start-up and then shared read-only; [`FilterRegistry::evaluate`] applies
//! a configured filter instance to an event context.

pub mod builtin;
mod registry;

pub use registry::{FilterRegistry, FilterScope};

use apiary_schema::Value;
use apiary_template::TemplateError;
use thiserror::Error;

/// A registered predicate implementation
pub trait Filter: Send + Sync {
    /// Registry key
    fn name(&self) -> &str;

    /// Human readable description
    fn description(&self) -> &str;

    /// Test `subject` (the observed context value) against the configured `value`
    fn passes(&self, scope: &FilterScope<'_>, subject: &Value, value: &Value)
        -> Result<bool, FilterError>;
}

/// Filter evaluation errors
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Filter not found: {0}")]
    NotFound(String),

    #[error("Invalid value for filter {filter}: {reason}")]
    InvalidValue { filter: String, reason: String },

    #[error("Invalid regex {pattern}: {message}")]
    Regex { pattern: String, message: String },

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Script error: {0}")]
    Script(String),
}

impl FilterError {
    pub fn invalid_value(filter: impl Into<String>, reason: impl Into<String>) -> Self {
        FilterError::InvalidValue {
            filter: filter.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "starlark")]
impl From<apiary_runtime_starlark::StarlarkRuntimeError> for FilterError {
    fn from(err: apiary_runtime_starlark::StarlarkRuntimeError) -> Self {
        FilterError::Script(err.to_string())
    }
}

#[cfg(feature = "lua")]
impl From<apiary_runtime_lua::LuaRuntimeError> for FilterError {
    fn from(err: apiary_runtime_lua::LuaRuntimeError) -> Self {
        FilterError::Script(err.to_string())
    }
}
