//! Apiary Engine
//!
//! The rule side of the hive: compiled chain sets, the chain engine that evaluates
//! them per event, and the [`Hive`] that wires bees, bus and engine together.

pub mod chains;
pub mod engine;
pub mod hive;

pub use chains::{ChainSet, CompiledChain, ConfigIssue};
pub use engine::{ChainEngine, ChainOutcome, EngineStats};
pub use hive::{Hive, HiveOptions};

use apiary_config::ConfigError;
use thiserror::Error;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Hive is already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine task failed: {0}")]
    Join(String),
}
