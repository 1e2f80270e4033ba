//! Stores backed by a configuration file.

use std::collections::HashMap;

use arc_swap::ArcSwap;

use crate::config::schema::{FileConfig, UpstreamConfig};
use crate::load_balancer::server::ServerDescriptor;
use crate::manager::stores::{ConfigStore, ServerStore};

/// Server and config store over the upstreams of a [`FileConfig`].
///
/// The initial size of every upstream is its server count in the first
/// loaded file.
#[derive(Debug)]
pub struct FileStore {
    config: ArcSwap<FileConfig>,
    initial_sizes: HashMap<String, usize>,
}

impl FileStore {
    pub fn new(config: FileConfig) -> Self {
        let initial_sizes = config
            .upstreams
            .iter()
            .map(|(name, entry)| (name.clone(), entry.servers.len()))
            .collect();
        Self {
            config: ArcSwap::from_pointee(config),
            initial_sizes,
        }
    }

    /// Swap in a reloaded file.
    pub fn replace(&self, config: FileConfig) {
        self.config.store(std::sync::Arc::new(config));
    }

    pub fn upstream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.load().upstreams.keys().cloned().collect();
        names.sort();
        names
    }
}

impl ServerStore for FileStore {
    fn get_servers(&self, upstream: &str) -> Vec<ServerDescriptor> {
        self.config
            .load()
            .upstreams
            .get(upstream)
            .map(|entry| entry.servers.clone())
            .unwrap_or_default()
    }

    fn get_initial_size(&self, upstream: &str) -> Option<usize> {
        self.initial_sizes.get(upstream).copied()
    }
}

impl ConfigStore for FileStore {
    fn get_upstream_config(&self, upstream: &str) -> Option<HashMap<String, UpstreamConfig>> {
        self.config
            .load()
            .upstreams
            .get(upstream)
            .map(|entry| entry.profiles.clone())
    }

    fn is_upstream_enabled(&self, upstream: &str) -> bool {
        self.config
            .load()
            .upstreams
            .get(upstream)
            .map_or(true, |entry| entry.enabled)
    }
}
