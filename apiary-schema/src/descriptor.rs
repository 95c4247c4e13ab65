//! Declarations a bee factory publishes about its options, events and actions
//!
//! The core consumes names, types, defaults and the mandatory flag; descriptions are
//! carried for listings.

use crate::{PlaceholderType, Value};
use serde::{Deserialize, Serialize};

/// Describes one in/out value of an event or action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: PlaceholderType,
    #[serde(default)]
    pub mandatory: bool,
}

impl PlaceholderDescriptor {
    pub fn new(name: impl Into<String>, kind: PlaceholderType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            mandatory: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

/// Describes one configuration option of a bee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: PlaceholderType,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub mandatory: bool,
}

impl OptionDescriptor {
    pub fn new(name: impl Into<String>, kind: PlaceholderType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            default: None,
            mandatory: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

/// Describes an event a bee can emit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: Vec<PlaceholderDescriptor>,
}

impl EventDescriptor {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            description: String::new(),
            options: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn option(mut self, option: PlaceholderDescriptor) -> Self {
        self.options.push(option);
        self
    }
}

/// Describes an action a bee accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: Vec<PlaceholderDescriptor>,
}

impl ActionDescriptor {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            description: String::new(),
            options: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn option(mut self, option: PlaceholderDescriptor) -> Self {
        self.options.push(option);
        self
    }

    /// Names of options that must be present when the action is delivered
    pub fn mandatory_options(&self) -> impl Iterator<Item = &str> {
        self.options
            .iter()
            .filter(|o| o.mandatory)
            .map(|o| o.name.as_str())
    }
}
