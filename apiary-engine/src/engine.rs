//! Chain engine
//!
//! Consumes the event bus one event at a time. For each event the matching chains
//! run in configuration order; filters gate the remaining elements of a chain and
//! actions are rendered and delivered straight to the target bee.

use crate::chains::{ChainSet, CompiledAction, CompiledChain, Step};
use apiary_core::{panic_message, EventReceiver, ShutdownSignal, Supervisor};
use apiary_event::{new_id, Action, Event};
use apiary_filters::FilterRegistry;
use apiary_schema::Value;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a chain run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every element ran
    Completed,
    /// A filter did not pass
    Filtered,
    /// A filter failed to evaluate
    Aborted,
}

/// Evaluates chains for events and dispatches their actions
pub struct ChainEngine {
    chains: Arc<ChainSet>,
    filters: Arc<FilterRegistry>,
    supervisor: Arc<Supervisor>,
    stats: EngineCounters,
}

impl ChainEngine {
    pub fn new(chains: Arc<ChainSet>, filters: Arc<FilterRegistry>, supervisor: Arc<Supervisor>) -> Self {
        Self {
            chains,
            filters,
            supervisor,
            stats: EngineCounters::default(),
        }
    }

    pub fn chains(&self) -> &Arc<ChainSet> {
        &self.chains
    }

    /// Consume events until `shutdown` fires, then drain what is already queued
    pub async fn run(&self, mut receiver: EventReceiver, shutdown: ShutdownSignal) {
        info!(chains = self.chains.len(), "Chain engine started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                event = receiver.recv() => match event {
                    Some(event) => self.handle(&event).await,
                    None => break,
                },
            }
        }

        receiver.close();
        while let Some(event) = receiver.recv().await {
            self.handle(&event).await;
        }

        info!(
            events = self.stats.events_handled.load(Ordering::Relaxed),
            "Chain engine stopped"
        );
    }

    /// Run every chain matching `event`
    pub async fn handle(&self, event: &Event) {
        self.stats.events_handled.fetch_add(1, Ordering::Relaxed);
        if let Some(bee) = self.supervisor.get(&event.bee) {
            bee.record_event();
        }

        let mut chains = self.chains.matching(&event.bee, &event.name).peekable();
        if chains.peek().is_none() {
            debug!(bee = %event.bee, event = %event.name, "No chain matches event");
            return;
        }

        let context = event.options.to_map();
        let data = Value::Map(context);
        for chain in chains {
            self.stats.chains_matched.fetch_add(1, Ordering::Relaxed);
            let outcome = self.run_chain(chain, &data).await;
            debug!(chain = %chain.name, ?outcome, "Chain finished");
        }
    }

    async fn run_chain(&self, chain: &CompiledChain, data: &Value) -> ChainOutcome {
        let Value::Map(context) = data else {
            return ChainOutcome::Aborted;
        };

        for step in &chain.steps {
            match step {
                Step::Filter(filter) => match self.filters.evaluate(filter, context) {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(chain = %chain.name, filter = %filter.name, "Filter did not pass");
                        return ChainOutcome::Filtered;
                    }
                    Err(e) => {
                        warn!(chain = %chain.name, filter = %filter.name, error = %e, "Filter failed, aborting chain");
                        self.stats.chains_aborted.fetch_add(1, Ordering::Relaxed);
                        return ChainOutcome::Aborted;
                    }
                },
                Step::Action(action) => self.dispatch(&chain.name, action, data).await,
                Step::MissingAction(id) => {
                    warn!(chain = %chain.name, action = %id, "Skipping unknown action reference");
                    self.stats.actions_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        ChainOutcome::Completed
    }

    /// Render and deliver one action; failures drop the action only
    async fn dispatch(&self, chain: &str, template: &CompiledAction, data: &Value) {
        if self.deliver(chain, template, data).await {
            self.stats.actions_dispatched.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.actions_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn deliver(&self, chain: &str, template: &CompiledAction, data: &Value) -> bool {
        let options = match template.render(data) {
            Ok(options) => options,
            Err(e) => {
                warn!(chain, bee = %template.bee, action = %template.name, error = %e, "Dropping action: template error");
                return false;
            }
        };

        let Some(bee) = self.supervisor.get(&template.bee) else {
            warn!(chain, bee = %template.bee, action = %template.name, "Dropping action: unknown bee");
            return false;
        };
        if !bee.is_running() {
            warn!(chain, bee = %template.bee, action = %template.name, state = %bee.state(), "Dropping action: bee not running");
            return false;
        }

        let action = Action {
            id: new_id(),
            bee: template.bee.clone(),
            name: template.name.clone(),
            options,
        };
        bee.record_action();
        debug!(chain, bee = %action.bee, action = %action.name, id = %action.id, "Delivering action");

        match AssertUnwindSafe(bee.bee().action(&action)).catch_unwind().await {
            Ok(Ok(outputs)) => {
                debug!(chain, bee = %action.bee, action = %action.name, outputs = outputs.len(), "Action completed");
                true
            }
            Ok(Err(e)) => {
                warn!(chain, bee = %action.bee, action = %action.name, error = %e, "Action failed");
                false
            }
            Err(panic) => {
                error!(chain, bee = %action.bee, action = %action.name, panic = %panic_message(&*panic), "Action handler panicked");
                false
            }
        }
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }
}

#[derive(Debug, Default)]
struct EngineCounters {
    events_handled: AtomicU64,
    chains_matched: AtomicU64,
    chains_aborted: AtomicU64,
    actions_dispatched: AtomicU64,
    actions_dropped: AtomicU64,
}

impl EngineCounters {
    fn snapshot(&self) -> EngineStats {
        EngineStats {
            events_handled: self.events_handled.load(Ordering::Relaxed),
            chains_matched: self.chains_matched.load(Ordering::Relaxed),
            chains_aborted: self.chains_aborted.load(Ordering::Relaxed),
            actions_dispatched: self.actions_dispatched.load(Ordering::Relaxed),
            actions_dropped: self.actions_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Engine statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub events_handled: u64,
    pub chains_matched: u64,
    pub chains_aborted: u64,
    pub actions_dispatched: u64,
    pub actions_dropped: u64,
}
