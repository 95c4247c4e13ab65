//! Hive: the application context
//!
//! Owns the factory and filter registries and, while running, the event bus, the
//! supervisor and the chain engine task. Reloading tears everything down and
//! builds it again from the new configuration.

use crate::chains::{ChainSet, ConfigIssue};
use crate::engine::{ChainEngine, EngineStats};
use crate::EngineError;
use apiary_config::HiveConfig;
use apiary_core::shutdown::{self, ShutdownTrigger};
use apiary_core::{BeeSnapshot, EventBus, EventBusConfig, FactoryRegistry, Supervisor, SupervisorConfig};
use apiary_filters::FilterRegistry;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Runtime settings of a hive
#[derive(Debug, Clone, Default)]
pub struct HiveOptions {
    pub bus: EventBusConfig,
    pub supervisor: SupervisorConfig,
}

struct Running {
    supervisor: Arc<Supervisor>,
    engine: Arc<ChainEngine>,
    engine_shutdown: ShutdownTrigger,
    engine_task: JoinHandle<()>,
}

/// Application context for one set of registries
pub struct Hive {
    factories: Arc<FactoryRegistry>,
    filters: Arc<FilterRegistry>,
    options: HiveOptions,
    config: RwLock<HiveConfig>,
    running: Mutex<Option<Running>>,
}

impl Hive {
    pub fn new(factories: FactoryRegistry, filters: FilterRegistry, options: HiveOptions) -> Self {
        Self {
            factories: Arc::new(factories),
            filters: Arc::new(filters),
            options,
            config: RwLock::new(HiveConfig::default()),
            running: Mutex::new(None),
        }
    }

    pub fn factories(&self) -> &Arc<FactoryRegistry> {
        &self.factories
    }

    pub fn filters(&self) -> &Arc<FilterRegistry> {
        &self.filters
    }

    /// Check a configuration without starting anything
    pub fn validate(&self, config: &HiveConfig) -> Vec<ConfigIssue> {
        ChainSet::compile(config, &self.factories, &self.filters)
            .issues()
            .to_vec()
    }

    /// Start bees and the chain engine for `config`
    ///
    /// Configuration issues and bees that fail to start are logged and returned;
    /// they never prevent the rest of the hive from running.
    pub async fn start(&self, config: HiveConfig) -> Result<Vec<ConfigIssue>, EngineError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let chains = Arc::new(ChainSet::compile(&config, &self.factories, &self.filters));
        let mut issues = chains.issues().to_vec();

        let (bus, receiver) = EventBus::new(self.options.bus.clone());
        let supervisor = Arc::new(Supervisor::new(
            self.factories.clone(),
            bus,
            self.options.supervisor.clone(),
        ));
        for failure in supervisor.start_all(&config.bees) {
            issues.push(ConfigIssue::BeeStart {
                bee: failure.bee().to_string(),
                message: failure.to_string(),
            });
        }

        for issue in &issues {
            warn!(issue = %issue, "Configuration issue");
        }

        let engine = Arc::new(ChainEngine::new(chains, self.filters.clone(), supervisor.clone()));
        let (engine_shutdown, signal) = shutdown::channel();
        let engine_task = tokio::spawn({
            let engine = engine.clone();
            async move { engine.run(receiver, signal).await }
        });

        info!(
            bees = supervisor.bees().len(),
            chains = engine.chains().len(),
            issues = issues.len(),
            "Hive started"
        );

        *self.config.write() = config;
        *running = Some(Running {
            supervisor,
            engine,
            engine_shutdown,
            engine_task,
        });
        Ok(issues)
    }

    /// Stop every bee, then drain and stop the engine; a stopped hive is left alone
    pub async fn stop(&self) -> Result<(), EngineError> {
        let mut slot = self.running.lock().await;
        let Some(running) = slot.take() else {
            return Ok(());
        };

        running.supervisor.stop_all().await;
        running.engine_shutdown.trigger();
        running
            .engine_task
            .await
            .map_err(|e| EngineError::Join(e.to_string()))?;

        let stats = running.engine.stats();
        info!(
            events = stats.events_handled,
            actions = stats.actions_dispatched,
            dropped = stats.actions_dropped,
            "Hive stopped"
        );
        Ok(())
    }

    /// Replace the running configuration; nothing of the old one survives
    pub async fn reload(&self, config: HiveConfig) -> Result<Vec<ConfigIssue>, EngineError> {
        info!("Reloading hive");
        self.stop().await?;
        self.start(config).await
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// The configuration last started
    pub fn config(&self) -> HiveConfig {
        self.config.read().clone()
    }

    /// Write the current configuration to `path`
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        apiary_config::save_file(path, &self.config.read())?;
        Ok(())
    }

    /// State of every running bee
    pub async fn bee_states(&self) -> Vec<BeeSnapshot> {
        match self.running.lock().await.as_ref() {
            Some(running) => running.supervisor.snapshot(),
            None => Vec::new(),
        }
    }

    /// Statistics of the running engine
    pub async fn stats(&self) -> Option<EngineStats> {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|running| running.engine.stats())
    }
}
