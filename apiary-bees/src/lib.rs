//! Apiary built-in bees
//!
//! A small set of bees that need nothing beyond the local machine, so a hive can
//! run out of the box.

pub mod execbee;
pub mod logbee;
pub mod timebee;

pub use execbee::ExecBeeFactory;
pub use logbee::LogBeeFactory;
pub use timebee::TimeBeeFactory;

use apiary_core::FactoryRegistry;
use std::sync::Arc;

/// Register every built-in bee factory
pub fn register_all(registry: &mut FactoryRegistry) {
    registry.register(Arc::new(TimeBeeFactory));
    registry.register(Arc::new(LogBeeFactory));
    registry.register(Arc::new(ExecBeeFactory));
}

/// Registry holding only the built-in factories
pub fn registry() -> FactoryRegistry {
    let mut registry = FactoryRegistry::new();
    register_all(&mut registry);
    registry
}
