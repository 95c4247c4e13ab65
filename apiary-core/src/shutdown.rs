//! Close-once shutdown signal

use tokio::sync::watch;

/// Owner side of a shutdown signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Observer side of a shutdown signal; cheap to clone
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/signal pair
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    /// Fire the signal; later calls have no further effect
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new observer of this trigger
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested or the trigger is gone
    pub async fn recv(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_fires_for_all_observers() {
        let (trigger, signal) = channel();
        let other = trigger.subscribe();
        assert!(!signal.is_shutdown());

        trigger.trigger();
        trigger.trigger();

        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), other.recv())
            .await
            .unwrap();
        assert!(signal.is_shutdown());
        assert!(trigger.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_trigger_releases_waiters() {
        let (trigger, signal) = channel();
        drop(trigger);
        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .unwrap();
    }
}
