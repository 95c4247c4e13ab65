//! Configuration file change watcher
//!
//! Polls the configuration file, hashes its contents and notifies subscribers when
//! the hash changes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Notification that the watched file changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// Incremented on every detected change
    pub version: u64,
    pub path: PathBuf,
}

/// Polling watcher for one configuration file
pub struct ConfigWatcher {
    path: PathBuf,
    interval: Duration,
    change_tx: broadcast::Sender<ConfigChange>,
    handle: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    /// Create a watcher; call [`ConfigWatcher::start`] to begin polling
    pub fn new(path: impl AsRef<Path>, interval: Duration) -> Self {
        let (change_tx, _) = broadcast::channel(16);
        Self {
            path: path.as_ref().to_path_buf(),
            interval,
            change_tx,
            handle: None,
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start polling in a background task
    ///
    /// The file's current contents are the baseline; only later changes notify.
    pub async fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let path = self.path.clone();
        let interval = self.interval;
        let change_tx = self.change_tx.clone();
        let mut last_hash = content_hash(&path).await.ok();

        info!(path = %path.display(), "Starting config file watcher");

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            let mut version = 0u64;

            loop {
                ticker.tick().await;

                match content_hash(&path).await {
                    Ok(hash) if Some(hash) != last_hash => {
                        last_hash = Some(hash);
                        version += 1;
                        info!(path = %path.display(), version, "Configuration file changed");
                        // No subscribers is not an error
                        let _ = change_tx.send(ConfigChange {
                            version,
                            path: path.clone(),
                        });
                    }
                    Ok(_) => debug!(path = %path.display(), "Configuration file unchanged"),
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to read config file"),
                }
            }
        }));
    }

    /// Stop polling
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn content_hash(path: &Path) -> std::io::Result<u64> {
    let content = tokio::fs::read(path).await?;
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    Ok(hasher.finish())
}
