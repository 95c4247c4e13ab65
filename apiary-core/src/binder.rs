//! Binding configured bee options to typed values
//!
//! Factories receive an [`OptionsBinder`] in `create` and pull each option out with
//! [`OptionsBinder::bind`]. Missing options fall back to the descriptor's default.

use apiary_schema::{convert, FromValue, OptionDescriptor, Placeholders, SchemaError};
use thiserror::Error;
use tracing::warn;

/// Option binding errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionError {
    #[error("Missing mandatory option: {0}")]
    Missing(String),

    #[error("Missing mandatory options: {}", .0.join(", "))]
    Incomplete(Vec<String>),

    #[error("Option {key}: expected {expected}, got {actual}")]
    TypeMismatch {
        key: String,
        expected: String,
        actual: String,
    },
}

impl From<SchemaError> for OptionError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::PlaceholderNotFound(key) => OptionError::Missing(key),
            SchemaError::TypeMismatch {
                name,
                expected,
                actual,
            } => OptionError::TypeMismatch {
                key: name,
                expected,
                actual,
            },
        }
    }
}

/// Configured options together with the factory's declarations
#[derive(Debug, Clone, Copy)]
pub struct OptionsBinder<'a> {
    options: &'a Placeholders,
    descriptors: &'a [OptionDescriptor],
}

impl<'a> OptionsBinder<'a> {
    pub fn new(options: &'a Placeholders, descriptors: &'a [OptionDescriptor]) -> Self {
        Self {
            options,
            descriptors,
        }
    }

    fn descriptor(&self, key: &str) -> Option<&'a OptionDescriptor> {
        self.descriptors.iter().find(|d| d.name == key)
    }

    /// Convert option `key` into `T`
    ///
    /// A configured `null` counts as absent.
    pub fn bind<T: FromValue + Default>(&self, key: &str) -> Result<T, OptionError> {
        if let Some(value) = self.options.value(key).filter(|v| !v.is_null()) {
            return Ok(convert(key, value)?);
        }

        match self.descriptor(key) {
            Some(OptionDescriptor {
                default: Some(default),
                ..
            }) => Ok(convert(key, default)?),
            Some(descriptor) if descriptor.mandatory => Err(OptionError::Missing(key.to_string())),
            _ => Ok(T::default()),
        }
    }

    /// Whether the option was configured
    pub fn is_set(&self, key: &str) -> bool {
        self.options.value(key).is_some_and(|v| !v.is_null())
    }

    /// Mandatory options that are neither configured nor defaulted
    pub fn missing(&self) -> Vec<&'a str> {
        self.descriptors
            .iter()
            .filter(|d| d.mandatory && d.default.is_none() && !self.is_set(&d.name))
            .map(|d| d.name.as_str())
            .collect()
    }

    /// Configured options the factory does not declare
    pub fn undeclared(&self) -> Vec<&'a str> {
        self.options
            .iter()
            .filter(|p| self.descriptor(&p.name).is_none())
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Check the configuration against the declarations
    ///
    /// Undeclared options are only logged.
    pub fn validate(&self) -> Result<(), OptionError> {
        for key in self.undeclared() {
            warn!(option = key, "Ignoring undeclared option");
        }

        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(OptionError::Incomplete(
                missing.into_iter().map(str::to_string).collect(),
            ))
        }
    }
}
