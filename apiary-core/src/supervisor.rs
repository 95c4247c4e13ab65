//! Worker supervision
//!
//! Each bee runs on its own tokio task with its own shutdown signal. The
//! supervisor starts bees from configuration, isolates panics in their run loops,
//! and stops them with join-before-return semantics.

use crate::shutdown::{self, ShutdownTrigger};
use crate::{Bee, BeeContext, BeeError, EventBusHandle, FactoryRegistry, OptionError, OptionsBinder};
use apiary_config::BeeConfig;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Supervisor configuration
#[derive(Debug, Clone, Default)]
pub struct SupervisorConfig {
    /// Restarts granted to a bee whose run loop panics
    pub max_restarts: u32,

    /// Abort bees that have not exited this long after being signalled
    pub stop_timeout: Option<Duration>,
}

/// Supervisor errors
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Unknown bee class {class} for bee {bee}")]
    UnknownFactory { bee: String, class: String },

    #[error("Duplicate bee name: {0}")]
    DuplicateBee(String),

    #[error("Invalid options for bee {bee}: {source}")]
    Options {
        bee: String,
        #[source]
        source: OptionError,
    },

    #[error("Failed to create bee {bee}: {source}")]
    Create {
        bee: String,
        #[source]
        source: BeeError,
    },
}

impl SupervisorError {
    /// Name of the bee the error is about
    pub fn bee(&self) -> &str {
        match self {
            SupervisorError::UnknownFactory { bee, .. }
            | SupervisorError::Options { bee, .. }
            | SupervisorError::Create { bee, .. } => bee,
            SupervisorError::DuplicateBee(bee) => bee,
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle of a bee: `Created -> Running -> Stopping -> Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BeeState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl BeeState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => BeeState::Created,
            1 => BeeState::Running,
            2 => BeeState::Stopping,
            _ => BeeState::Stopped,
        }
    }
}

impl fmt::Display for BeeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BeeState::Created => "created",
            BeeState::Running => "running",
            BeeState::Stopping => "stopping",
            BeeState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Bee state readable from any thread
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: BeeState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> BeeState {
        BeeState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: BeeState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; false if the cell held another state
    pub fn transition(&self, from: BeeState, to: BeeState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// ============================================================================
// Handles
// ============================================================================

/// A supervised bee
pub struct BeeHandle {
    config: BeeConfig,
    bee: Arc<dyn Bee>,
    state: Arc<StateCell>,
    trigger: ShutdownTrigger,
    task: Mutex<Option<JoinHandle<()>>>,
    last_event: Mutex<Option<SystemTime>>,
    last_action: Mutex<Option<SystemTime>>,
}

impl BeeHandle {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Factory id the bee was built by
    pub fn namespace(&self) -> &str {
        &self.config.class
    }

    pub fn config(&self) -> &BeeConfig {
        &self.config
    }

    pub fn bee(&self) -> &Arc<dyn Bee> {
        &self.bee
    }

    pub fn state(&self) -> BeeState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == BeeState::Running
    }

    pub fn record_event(&self) {
        *self.last_event.lock() = Some(SystemTime::now());
    }

    pub fn record_action(&self) {
        *self.last_action.lock() = Some(SystemTime::now());
    }

    pub fn last_event(&self) -> Option<SystemTime> {
        *self.last_event.lock()
    }

    pub fn last_action(&self) -> Option<SystemTime> {
        *self.last_action.lock()
    }

    /// Current configuration, state and activity
    pub fn snapshot(&self) -> BeeSnapshot {
        BeeSnapshot {
            config: self.config.clone(),
            state: self.state(),
            last_event: self.last_event(),
            last_action: self.last_action(),
        }
    }

    fn signal(&self) {
        self.state.transition(BeeState::Running, BeeState::Stopping);
        self.trigger.trigger();
    }

    async fn join(&self, stop_timeout: Option<Duration>) {
        let task = self.task.lock().take();
        if let Some(mut task) = task {
            match stop_timeout {
                Some(limit) => {
                    if tokio::time::timeout(limit, &mut task).await.is_err() {
                        warn!(bee = %self.name(), "Bee did not stop in time, aborting");
                        task.abort();
                        let _ = task.await;
                    }
                }
                None => {
                    let _ = task.await;
                }
            }
        }
        self.state.set(BeeState::Stopped);
    }
}

impl fmt::Debug for BeeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeeHandle")
            .field("name", &self.config.name)
            .field("class", &self.config.class)
            .field("state", &self.state())
            .finish()
    }
}

/// Point-in-time view of a bee
#[derive(Debug, Clone, Serialize)]
pub struct BeeSnapshot {
    pub config: BeeConfig,
    pub state: BeeState,
    pub last_event: Option<SystemTime>,
    pub last_action: Option<SystemTime>,
}

// ============================================================================
// Supervisor
// ============================================================================

/// Starts, tracks and stops bees
pub struct Supervisor {
    factories: Arc<FactoryRegistry>,
    bus: EventBusHandle,
    config: SupervisorConfig,
    bees: RwLock<Vec<Arc<BeeHandle>>>,
}

impl Supervisor {
    pub fn new(factories: Arc<FactoryRegistry>, bus: EventBusHandle, config: SupervisorConfig) -> Self {
        Self {
            factories,
            bus,
            config,
            bees: RwLock::new(Vec::new()),
        }
    }

    pub fn factories(&self) -> &Arc<FactoryRegistry> {
        &self.factories
    }

    /// Build and spawn one bee
    pub fn start(&self, config: &BeeConfig) -> Result<Arc<BeeHandle>, SupervisorError> {
        if self.get(&config.name).is_some() {
            return Err(SupervisorError::DuplicateBee(config.name.clone()));
        }

        let factory =
            self.factories
                .get(&config.class)
                .ok_or_else(|| SupervisorError::UnknownFactory {
                    bee: config.name.clone(),
                    class: config.class.clone(),
                })?;

        let descriptors = factory.options();
        let binder = OptionsBinder::new(&config.options, &descriptors);
        binder.validate().map_err(|source| SupervisorError::Options {
            bee: config.name.clone(),
            source,
        })?;
        let bee = factory
            .create(config, &binder)
            .map_err(|source| SupervisorError::Create {
                bee: config.name.clone(),
                source,
            })?;

        let (trigger, signal) = shutdown::channel();
        let ctx = BeeContext {
            name: config.name.clone(),
            emitter: self.bus.emitter(config.name.clone(), signal.clone()),
            shutdown: signal,
        };
        let state = Arc::new(StateCell::new(BeeState::Created));

        state.set(BeeState::Running);
        let task = tokio::spawn(supervise(
            bee.clone(),
            ctx,
            state.clone(),
            self.config.max_restarts,
        ));

        let handle = Arc::new(BeeHandle {
            config: config.clone(),
            bee,
            state,
            trigger,
            task: Mutex::new(Some(task)),
            last_event: Mutex::new(None),
            last_action: Mutex::new(None),
        });
        self.bees.write().push(handle.clone());

        info!(bee = %config.name, class = %config.class, "Started bee");
        Ok(handle)
    }

    /// Start every bee; a failing bee never prevents the others from starting
    pub fn start_all(&self, configs: &[BeeConfig]) -> Vec<SupervisorError> {
        let mut failures = Vec::new();
        for config in configs {
            if let Err(e) = self.start(config) {
                error!(bee = %config.name, error = %e, "Failed to start bee");
                failures.push(e);
            }
        }
        failures
    }

    /// Signal every bee, then wait for every bee task to end
    pub async fn stop_all(&self) {
        let handles: Vec<Arc<BeeHandle>> = std::mem::take(&mut *self.bees.write());
        if handles.is_empty() {
            return;
        }

        info!(count = handles.len(), "Stopping bees");
        for handle in &handles {
            handle.signal();
        }
        for handle in &handles {
            handle.join(self.config.stop_timeout).await;
        }
        info!(count = handles.len(), "All bees stopped");
    }

    pub fn get(&self, name: &str) -> Option<Arc<BeeHandle>> {
        self.bees.read().iter().find(|h| h.name() == name).cloned()
    }

    /// Supervised bees in start order
    pub fn bees(&self) -> Vec<Arc<BeeHandle>> {
        self.bees.read().clone()
    }

    pub fn snapshot(&self) -> Vec<BeeSnapshot> {
        self.bees.read().iter().map(|h| h.snapshot()).collect()
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("bees", &*self.bees.read())
            .finish()
    }
}

/// Run a bee's loop, isolating panics and restarting within budget
async fn supervise(bee: Arc<dyn Bee>, ctx: BeeContext, state: Arc<StateCell>, max_restarts: u32) {
    let mut restarts = 0;

    loop {
        match AssertUnwindSafe(bee.run(ctx.clone())).catch_unwind().await {
            Ok(Ok(())) => {
                info!(bee = %ctx.name, "Bee stopped");
                break;
            }
            Ok(Err(e)) => {
                error!(bee = %ctx.name, error = %e, "Bee failed");
                break;
            }
            Err(panic) => {
                error!(bee = %ctx.name, panic = %panic_message(&*panic), "Bee panicked");
                if ctx.shutdown.is_shutdown() || restarts >= max_restarts {
                    break;
                }
                restarts += 1;
                warn!(bee = %ctx.name, restarts, "Restarting bee");
            }
        }
    }

    state.set(BeeState::Stopped);
}

/// Human readable payload of a caught panic
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
