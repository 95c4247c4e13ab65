//! Factory registry

use crate::BeeFactory;
use ahash::AHashMap;
use apiary_schema::{ActionDescriptor, EventDescriptor};
use std::sync::Arc;
use tracing::debug;

/// Registry of bee factories keyed by class id
///
/// Filled once at start-up and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: AHashMap<String, Arc<dyn BeeFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its id, replacing any previous one
    pub fn register(&mut self, factory: Arc<dyn BeeFactory>) {
        debug!(factory = factory.id(), "Registered bee factory");
        self.factories.insert(factory.id().to_string(), factory);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn BeeFactory>> {
        self.factories.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered factories sorted by id
    pub fn factories(&self) -> Vec<Arc<dyn BeeFactory>> {
        let mut factories: Vec<_> = self.factories.values().cloned().collect();
        factories.sort_by(|a, b| a.id().cmp(b.id()));
        factories
    }

    /// Declared event `name` of factory `class`
    pub fn event(&self, class: &str, name: &str) -> Option<EventDescriptor> {
        self.factories
            .get(class)?
            .events()
            .into_iter()
            .find(|e| e.name == name)
    }

    /// Declared action `name` of factory `class`
    pub fn action(&self, class: &str, name: &str) -> Option<ActionDescriptor> {
        self.factories
            .get(class)?
            .actions()
            .into_iter()
            .find(|a| a.name == name)
    }
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("FactoryRegistry")
            .field("factories", &ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bee, BeeContext, BeeError, OptionsBinder};
    use apiary_config::BeeConfig;
    use async_trait::async_trait;

    struct Idle;

    #[async_trait]
    impl Bee for Idle {
        async fn run(&self, ctx: BeeContext) -> Result<(), BeeError> {
            ctx.shutdown.recv().await;
            Ok(())
        }
    }

    struct IdleFactory;

    impl BeeFactory for IdleFactory {
        fn id(&self) -> &str {
            "idle"
        }

        fn name(&self) -> &str {
            "Idle"
        }

        fn description(&self) -> &str {
            "does nothing"
        }

        fn events(&self) -> Vec<EventDescriptor> {
            vec![EventDescriptor::new("idle", "nap")]
        }

        fn create(
            &self,
            _config: &BeeConfig,
            _options: &OptionsBinder<'_>,
        ) -> Result<Arc<dyn Bee>, BeeError> {
            Ok(Arc::new(Idle))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = FactoryRegistry::new();
        registry.register(Arc::new(IdleFactory));

        assert!(registry.contains("idle"));
        assert_eq!(registry.len(), 1);
        assert!(registry.event("idle", "nap").is_some());
        assert!(registry.event("idle", "wake").is_none());
        assert!(registry.action("idle", "anything").is_none());
        assert!(registry.event("other", "nap").is_none());
    }
}
