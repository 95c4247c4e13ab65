//! Event Bus Implementation
//!
//! The bus carries events from bees to the chain engine. It is a bounded channel
//! with a single consumer; with the default capacity of 1 a publishing bee waits
//! until the engine has taken its event, so backpressure stalls only the producer.

use crate::ShutdownSignal;
use apiary_event::Event;
use apiary_schema::Placeholders;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Event bus configuration
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { capacity: 1 }
    }
}

/// Event bus constructor
pub struct EventBus;

impl EventBus {
    /// Create a bus and return its publishing handle and its single receiver
    pub fn new(config: EventBusConfig) -> (EventBusHandle, EventReceiver) {
        let metrics = Arc::new(EventBusMetrics::default());
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));

        let handle = EventBusHandle {
            sender,
            metrics: metrics.clone(),
        };
        let receiver = EventReceiver { receiver, metrics };
        (handle, receiver)
    }
}

/// Handle for publishing events to the bus
#[derive(Debug, Clone)]
pub struct EventBusHandle {
    sender: mpsc::Sender<Event>,
    metrics: Arc<EventBusMetrics>,
}

impl EventBusHandle {
    /// Publish a single event, waiting for capacity
    pub async fn publish(&self, event: Event) -> Result<(), PublishError> {
        self.sender.send(event).await.map_err(|_| {
            self.metrics.events_rejected.fetch_add(1, Ordering::Relaxed);
            PublishError::Closed
        })?;
        self.metrics.events_published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Try to publish without blocking
    pub fn try_publish(&self, event: Event) -> Result<(), PublishError> {
        self.sender.try_send(event).map_err(|e| {
            self.metrics.events_rejected.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => PublishError::Full,
                mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
            }
        })?;
        self.metrics.events_published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Emitter bound to a bee's name and shutdown signal
    pub fn emitter(&self, bee: impl Into<String>, shutdown: ShutdownSignal) -> EventEmitter {
        EventEmitter {
            bee: bee.into(),
            handle: self.clone(),
            shutdown,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> EventBusMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// The consuming end of the bus
#[derive(Debug)]
pub struct EventReceiver {
    receiver: mpsc::Receiver<Event>,
    metrics: Arc<EventBusMetrics>,
}

impl EventReceiver {
    /// Receive the next event; `None` once the bus is closed and drained
    pub async fn recv(&mut self) -> Option<Event> {
        let event = self.receiver.recv().await?;
        self.metrics.events_consumed.fetch_add(1, Ordering::Relaxed);
        Some(event)
    }

    /// Refuse further events; already queued events can still be received
    pub fn close(&mut self) {
        self.receiver.close();
    }

    pub fn metrics(&self) -> EventBusMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// A bee's publishing endpoint
///
/// Events carry the bee's name as their source. Publishing gives up as soon as the
/// bee's shutdown signal fires.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    bee: String,
    handle: EventBusHandle,
    shutdown: ShutdownSignal,
}

impl EventEmitter {
    pub fn bee(&self) -> &str {
        &self.bee
    }

    /// Publish an event named `name` with the given options
    pub async fn emit(
        &self,
        name: impl Into<String>,
        options: Placeholders,
    ) -> Result<(), PublishError> {
        let event = Event {
            bee: self.bee.clone(),
            name: name.into(),
            options,
        };
        trace!(bee = %event.bee, event = %event.name, "Emitting event");

        tokio::select! {
            biased;
            _ = self.shutdown.recv() => Err(PublishError::Shutdown),
            result = self.handle.publish(event) => result,
        }
    }
}

/// Event bus metrics (atomic for lock-free access)
#[derive(Debug, Default)]
struct EventBusMetrics {
    events_published: AtomicU64,
    events_consumed: AtomicU64,
    events_rejected: AtomicU64,
}

impl EventBusMetrics {
    fn snapshot(&self) -> EventBusMetricsSnapshot {
        EventBusMetricsSnapshot {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_consumed: self.events_consumed.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of event bus metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventBusMetricsSnapshot {
    pub events_published: u64,
    pub events_consumed: u64,
    pub events_rejected: u64,
}

/// Error publishing an event
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event bus is closed")]
    Closed,

    #[error("Event bus is full")]
    Full,

    #[error("Bee is shutting down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let (handle, mut receiver) = EventBus::new(EventBusConfig::default());

        handle.publish(Event::new("timer", "tick")).await.unwrap();
        let event = receiver.recv().await.unwrap();

        assert_eq!(event.bee, "timer");
        let metrics = receiver.metrics();
        assert_eq!(metrics.events_published, 1);
        assert_eq!(metrics.events_consumed, 1);
    }

    #[tokio::test]
    async fn test_capacity_one_applies_backpressure() {
        let (handle, mut receiver) = EventBus::new(EventBusConfig::default());

        handle.try_publish(Event::new("a", "one")).unwrap();
        assert!(matches!(
            handle.try_publish(Event::new("a", "two")),
            Err(PublishError::Full)
        ));

        let pending = handle.publish(Event::new("a", "two"));
        tokio::pin!(pending);
        assert!(tokio::time::timeout(Duration::from_millis(50), &mut pending)
            .await
            .is_err());

        assert_eq!(receiver.recv().await.unwrap().name, "one");
        pending.await.unwrap();
        assert_eq!(receiver.recv().await.unwrap().name, "two");
    }

    #[tokio::test]
    async fn test_emitter_gives_up_on_shutdown() {
        let (handle, _receiver) = EventBus::new(EventBusConfig::default());
        let (trigger, signal) = shutdown::channel();
        let emitter = handle.emitter("busy", signal);

        emitter.emit("first", Placeholders::new()).await.unwrap();

        let blocked = tokio::spawn(async move { emitter.emit("second", Placeholders::new()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();

        let result = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(PublishError::Shutdown)));
    }

    #[tokio::test]
    async fn test_closed_receiver_drains_then_ends() {
        let (handle, mut receiver) = EventBus::new(EventBusConfig { capacity: 4 });
        handle.publish(Event::new("a", "queued")).await.unwrap();

        receiver.close();
        assert!(matches!(
            handle.publish(Event::new("a", "late")).await,
            Err(PublishError::Closed)
        ));
        assert_eq!(receiver.recv().await.unwrap().name, "queued");
        assert!(receiver.recv().await.is_none());
    }
}
