//! Bee and factory contracts

use crate::{EventEmitter, OptionError, OptionsBinder, PublishError, ShutdownSignal};
use apiary_config::BeeConfig;
use apiary_event::{Action, ActionError};
use apiary_schema::{ActionDescriptor, EventDescriptor, OptionDescriptor, Placeholders};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Everything a running bee gets from the supervisor
#[derive(Debug, Clone)]
pub struct BeeContext {
    /// The bee's configured name
    pub name: String,

    /// Publishes events under the bee's name
    pub emitter: EventEmitter,

    /// Fires when the bee must return from `run`
    pub shutdown: ShutdownSignal,
}

/// A running worker
///
/// `run` loops until `ctx.shutdown` fires and must observe the signal at every
/// blocking point. `action` is awaited by the chain engine while it holds the
/// event loop, so it should return quickly and must not publish events itself.
#[async_trait]
pub trait Bee: Send + Sync {
    /// Main loop
    async fn run(&self, ctx: BeeContext) -> Result<(), BeeError>;

    /// Handle an action addressed to this bee
    async fn action(&self, action: &Action) -> Result<Placeholders, ActionError> {
        Err(ActionError::UnknownAction {
            bee: action.bee.clone(),
            action: action.name.clone(),
        })
    }
}

/// Named constructor for one class of bees
pub trait BeeFactory: Send + Sync {
    /// Class id that `BeeConfig::class` refers to
    fn id(&self) -> &str;

    /// Display name
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn options(&self) -> Vec<OptionDescriptor> {
        Vec::new()
    }

    fn events(&self) -> Vec<EventDescriptor> {
        Vec::new()
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        Vec::new()
    }

    /// Build a bee; options are bound here, not in `run`
    fn create(
        &self,
        config: &BeeConfig,
        options: &OptionsBinder<'_>,
    ) -> Result<Arc<dyn Bee>, BeeError>;
}

/// Bee construction and runtime errors
#[derive(Debug, Error)]
pub enum BeeError {
    #[error("Option error: {0}")]
    Option(#[from] OptionError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Runtime(String),
}

impl BeeError {
    pub fn runtime(message: impl Into<String>) -> Self {
        BeeError::Runtime(message.into())
    }
}
