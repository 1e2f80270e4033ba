//! Registry of upstreams.
//!
//! # Responsibilities
//! - Create and update upstreams from the discovery stores
//! - Refuse updates that would shrink an upstream too far
//! - Resolve a logical name (optionally with a scheme) to an upstream
//!
//! # Design Decisions
//! - A rejected update keeps the previous state untouched
//! - The known-good size is the current server count, or the store's
//!   initial size for an upstream that has none yet

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::config::schema::{BalancerSettings, UpstreamConfig};
use crate::load_balancer::scheduler::{ReactivationScheduler, TokioScheduler};
use crate::load_balancer::server::{ServerDescriptor, ServerError};
use crate::load_balancer::upstream::{ProfiledUpstream, Upstream, UpstreamSnapshot};
use crate::manager::stores::{ConfigStore, ServerStore};
use crate::observability::metrics::MonitoringSink;

/// Reasons an upstream update was not applied.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("upstream '{upstream}' update ignored: {received} servers received, {known} known")]
    Degraded {
        upstream: String,
        known: usize,
        received: usize,
    },

    #[error("upstream '{upstream}' update ignored: no server in datacenter '{datacenter}'")]
    NoLocalDatacenter { upstream: String, datacenter: String },

    #[error("upstream '{upstream}': {source}")]
    Server {
        upstream: String,
        #[source]
        source: ServerError,
    },
}

impl UpdateError {
    /// True for safety rejections, as opposed to invalid input.
    pub fn is_ignored_update(&self) -> bool {
        matches!(self, Self::Degraded { .. } | Self::NoLocalDatacenter { .. })
    }
}

/// Registry of upstreams by name.
#[derive(Debug)]
pub struct BalancingUpstreamManager {
    upstreams: DashMap<String, Arc<Upstream>>,
    settings: BalancerSettings,
    server_store: Arc<dyn ServerStore>,
    config_store: Arc<dyn ConfigStore>,
    monitoring: Arc<dyn MonitoringSink>,
    scheduler: Arc<dyn ReactivationScheduler>,
}

impl BalancingUpstreamManager {
    /// A timeout multiplier that is not finite and positive is reset to 1.0.
    pub fn new(
        mut settings: BalancerSettings,
        server_store: Arc<dyn ServerStore>,
        config_store: Arc<dyn ConfigStore>,
        monitoring: Arc<dyn MonitoringSink>,
    ) -> Self {
        let multiplier = settings.timeout_multiplier;
        if !(multiplier.is_finite() && multiplier > 0.0) {
            tracing::warn!(multiplier, "Invalid timeout multiplier, using 1.0");
            settings.timeout_multiplier = 1.0;
        }
        Self {
            upstreams: DashMap::new(),
            settings,
            server_store,
            config_store,
            monitoring,
            scheduler: Arc::new(TokioScheduler),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn ReactivationScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn settings(&self) -> &BalancerSettings {
        &self.settings
    }

    pub fn monitoring(&self) -> &Arc<dyn MonitoringSink> {
        &self.monitoring
    }

    /// Refresh `names` from the stores.
    ///
    /// Every name is processed. Invalid server lists are always reported;
    /// safety rejections only when `fail_on_ignored_update` is set. The first
    /// reportable error is returned.
    pub fn update_upstreams<S: AsRef<str>>(&self, names: &[S]) -> Result<(), UpdateError> {
        let mut first_error = None;
        for name in names {
            let Err(error) = self.update_upstream(name.as_ref()) else {
                continue;
            };
            let report = !error.is_ignored_update() || self.settings.fail_on_ignored_update;
            if report && first_error.is_none() {
                first_error = Some(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn update_upstream(&self, name: &str) -> Result<(), UpdateError> {
        let servers = self.server_store.get_servers(name);
        let configs = self.config_store.get_upstream_config(name);

        if configs.is_none() && servers.is_empty() {
            if self.upstreams.remove(name).is_some() {
                tracing::info!(upstream = %name, "Upstream removed");
            }
            return Ok(());
        }

        let existing = self.upstreams.get(name).map(|entry| Arc::clone(entry.value()));
        self.check_update(name, existing.as_deref(), &servers)?;

        let configs: HashMap<String, UpstreamConfig> = configs.unwrap_or_default();
        let upstream = match existing {
            Some(upstream) => upstream,
            None => {
                let upstream = Upstream::new(name, self.settings.datacenter.as_deref(), self.settings.allow_cross_dc)
                    .with_scheduler(Arc::clone(&self.scheduler));
                tracing::info!(upstream = %name, "Upstream created");
                Arc::new(upstream)
            }
        };

        upstream
            .update_config(configs, &servers)
            .map_err(|source| UpdateError::Server {
                upstream: name.to_string(),
                source,
            })?;
        upstream.set_enabled(self.config_store.is_upstream_enabled(name));
        self.upstreams.insert(name.to_string(), upstream);
        Ok(())
    }

    fn check_update(&self, name: &str, existing: Option<&Upstream>, servers: &[ServerDescriptor]) -> Result<(), UpdateError> {
        let known = existing
            .map(Upstream::server_count)
            .filter(|&count| count > 0)
            .or_else(|| self.server_store.get_initial_size(name))
            .unwrap_or(0);

        let kept_part = 1.0 - self.settings.allowed_degradation_part.clamp(0.0, 1.0);
        if (servers.len() as f64) < known as f64 * kept_part {
            tracing::warn!(
                upstream = %name,
                known,
                received = servers.len(),
                allowed_degradation_part = self.settings.allowed_degradation_part,
                "Ignoring degraded server list"
            );
            self.monitoring.count_update_ignore(name, self.settings.datacenter.as_deref());
            return Err(UpdateError::Degraded {
                upstream: name.to_string(),
                known,
                received: servers.len(),
            });
        }

        if let (true, Some(datacenter)) = (self.settings.skip_update_without_local_dc, &self.settings.datacenter) {
            let has_local = servers.iter().any(|server| {
                server
                    .datacenter
                    .as_deref()
                    .is_some_and(|dc| dc.eq_ignore_ascii_case(datacenter))
            });
            if !has_local {
                tracing::warn!(upstream = %name, datacenter = %datacenter, "Ignoring server list without local servers");
                self.monitoring.count_update_ignore(name, Some(datacenter));
                return Err(UpdateError::NoLocalDatacenter {
                    upstream: name.to_string(),
                    datacenter: datacenter.clone(),
                });
            }
        }

        Ok(())
    }

    /// Look up an upstream by name. A leading `scheme://` is ignored.
    pub fn get_upstream(&self, name: &str, profile: &str) -> Option<ProfiledUpstream> {
        let name = name.split_once("://").map_or(name, |(_, rest)| rest);
        self.upstreams
            .get(name)
            .map(|entry| ProfiledUpstream::new(Arc::clone(entry.value()), profile))
    }

    pub fn upstream_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.upstreams.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Diagnostic views of all upstreams, sorted by name.
    pub fn snapshots(&self) -> Vec<UpstreamSnapshot> {
        let mut snapshots: Vec<UpstreamSnapshot> = self.upstreams.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}
