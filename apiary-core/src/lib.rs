//! Apiary Core
//!
//! Worker ("bee") contracts and the machinery that runs them: option binding,
//! the factory registry, the event bus and the supervisor.

pub mod bee;
pub mod binder;
pub mod eventbus;
pub mod factory;
pub mod shutdown;
pub mod supervisor;

pub use bee::{Bee, BeeContext, BeeError, BeeFactory};
pub use binder::{OptionError, OptionsBinder};
pub use eventbus::{
    EventBus, EventBusConfig, EventBusHandle, EventBusMetricsSnapshot, EventEmitter,
    EventReceiver, PublishError,
};
pub use factory::FactoryRegistry;
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
pub use supervisor::{
    panic_message, BeeHandle, BeeSnapshot, BeeState, StateCell, Supervisor, SupervisorConfig,
    SupervisorError,
};

// Re-export the crates bee implementations need
pub use apiary_config;
pub use apiary_event;
pub use apiary_schema;
pub use async_trait::async_trait;
