//! Apiary Event Model
//!
//! Events are published by bees; actions are delivered to bees. Both carry their
//! parameters as ordered [`Placeholders`].

use apiary_schema::{PlaceholderType, Placeholders, SchemaError, Value};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A notification published by a bee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Name of the bee that produced the event
    pub bee: String,

    /// Event name, as declared by the bee's factory
    pub name: String,

    /// Event parameters
    #[serde(default)]
    pub options: Placeholders,
}

impl Event {
    /// Create a new event without parameters
    pub fn new(bee: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bee: bee.into(),
            name: name.into(),
            options: Placeholders::new(),
        }
    }

    /// Add a parameter to the event
    pub fn with_option(
        mut self,
        name: impl Into<String>,
        kind: PlaceholderType,
        value: impl Into<Value>,
    ) -> Self {
        self.options.set(name, kind, value);
        self
    }

    /// Get a parameter value by name
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.value(name)
    }

    /// Create an event builder
    pub fn builder() -> EventBuilder {
        EventBuilder::default()
    }
}

/// Event builder for convenient event construction
#[derive(Debug, Default)]
pub struct EventBuilder {
    bee: Option<String>,
    name: Option<String>,
    options: Placeholders,
}

impl EventBuilder {
    /// Set the producing bee
    pub fn bee(mut self, bee: impl Into<String>) -> Self {
        self.bee = Some(bee.into());
        self
    }

    /// Set the event name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a parameter
    pub fn option(
        mut self,
        name: impl Into<String>,
        kind: PlaceholderType,
        value: impl Into<Value>,
    ) -> Self {
        self.options.set(name, kind, value);
        self
    }

    /// Build the event
    pub fn build(self) -> Result<Event, BuildError> {
        Ok(Event {
            bee: self.bee.ok_or(BuildError::MissingField("bee"))?,
            name: self.name.ok_or(BuildError::MissingField("name"))?,
            options: self.options,
        })
    }
}

/// A command delivered to a bee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique id of this action instance
    #[serde(default = "new_id")]
    pub id: String,

    /// Name of the target bee
    pub bee: String,

    /// Action name, as declared by the bee's factory
    pub name: String,

    /// Action parameters
    #[serde(default)]
    pub options: Placeholders,
}

impl Action {
    /// Create a new action with a fresh id
    pub fn new(bee: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            bee: bee.into(),
            name: name.into(),
            options: Placeholders::new(),
        }
    }

    /// Add a parameter to the action
    pub fn with_option(
        mut self,
        name: impl Into<String>,
        kind: PlaceholderType,
        value: impl Into<Value>,
    ) -> Self {
        self.options.set(name, kind, value);
        self
    }

    /// Get a parameter value by name
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.value(name)
    }

    /// Get a string parameter that must be present
    pub fn require_str(&self, name: &str) -> Result<&str, ActionError> {
        match self.options.require(name, PlaceholderType::String)? {
            Value::String(s) => Ok(s),
            other => Err(ActionError::InvalidOption {
                name: name.to_string(),
                reason: format!("expected string, got {}", other.type_name()),
            }),
        }
    }
}

/// Generate a unique id for actions and configuration entries
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Error building an event
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Error returned by a bee's action handler
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Unknown action {action} for bee {bee}")]
    UnknownAction { bee: String, action: String },

    #[error("Invalid option {name}: {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("Action failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SchemaError> for ActionError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::PlaceholderNotFound(name) => ActionError::InvalidOption {
                name,
                reason: "missing".to_string(),
            },
            SchemaError::TypeMismatch {
                name,
                expected,
                actual,
            } => ActionError::InvalidOption {
                name,
                reason: format!("expected {}, got {}", expected, actual),
            },
        }
    }
}

// Re-export apiary_schema for convenience
pub use apiary_schema;
