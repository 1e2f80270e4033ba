//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::file_store::FileStore;
use crate::config::loader::load_config;
use crate::config::schema::FileConfig;
use crate::manager::BalancingUpstreamManager;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<FileConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for validated configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<FileConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. Dropping the returned watcher stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!(path = ?path, "Config file change detected, reloading");
                    match load_config(&path) {
                        Ok(config) => {
                            let _ = tx.send(config);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Apply reloaded configurations until the channel closes.
///
/// Each configuration replaces the store contents, then every upstream named
/// by the old or the new file is refreshed.
pub async fn apply_updates(
    mut updates: mpsc::UnboundedReceiver<FileConfig>,
    store: Arc<FileStore>,
    manager: Arc<BalancingUpstreamManager>,
) {
    while let Some(config) = updates.recv().await {
        store.replace(config);

        let mut names = manager.upstream_names();
        names.extend(store.upstream_names());
        names.sort();
        names.dedup();

        match manager.update_upstreams(&names) {
            Ok(()) => tracing::info!(upstreams = names.len(), "Configuration applied"),
            Err(e) => tracing::warn!(error = %e, "Configuration partially applied"),
        }
    }
    tracing::debug!("Config update channel closed");
}
