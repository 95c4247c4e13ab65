//! Apiary Configuration
//!
//! The configuration of a hive: bees with their options, reusable actions and
//! chains. Provides the serde data model, JSON/YAML loading and saving, and a
//! polling watcher that reports file changes.

pub mod loader;
pub mod model;
pub mod watcher;

pub use loader::{load_file, save_file, ConfigFormat};
pub use model::{
    ActionConfig, ActionSpec, BeeConfig, ChainConfig, ChainElement, EventPattern, FilterConfig,
    FilterOption, FilterSpec, HiveConfig, LUA_FILTER, STARLARK_FILTER, TEMPLATE_FILTER,
};
pub use watcher::{ConfigChange, ConfigWatcher};

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
