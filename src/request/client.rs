//! Entry point for callers: resolve the host, then balance.

use std::sync::Arc;

use crate::config::schema::{UpstreamConfig, DEFAULT_PROFILE};
use crate::manager::BalancingUpstreamManager;
use crate::request::executor::RequestExecutor;
use crate::request::external::ExternalUrlRequestor;
use crate::request::types::{OutboundRequest, UpstreamResponse};
use crate::request::upstream_balancer::UpstreamRequestBalancer;

/// Per-call options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub profile: String,
    /// Treat POST requests as idempotent when deciding on retries.
    pub force_idempotence: bool,
    /// Use health/latency weighted selection instead of least-loaded.
    pub adaptive: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            profile: DEFAULT_PROFILE.to_string(),
            force_idempotence: false,
            adaptive: false,
        }
    }
}

impl RequestOptions {
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn force_idempotence(mut self) -> Self {
        self.force_idempotence = true;
        self
    }

    pub fn adaptive(mut self) -> Self {
        self.adaptive = true;
        self
    }
}

/// Balancing HTTP client.
#[derive(Debug, Clone)]
pub struct BalancingClient {
    manager: Arc<BalancingUpstreamManager>,
    executor: Arc<dyn RequestExecutor>,
    external_config: UpstreamConfig,
}

impl BalancingClient {
    pub fn new(manager: Arc<BalancingUpstreamManager>, executor: Arc<dyn RequestExecutor>) -> Self {
        Self {
            manager,
            executor,
            external_config: UpstreamConfig::default(),
        }
    }

    /// Settings for requests to hosts that are not upstreams.
    pub fn with_external_config(mut self, config: UpstreamConfig) -> Self {
        self.external_config = config;
        self
    }

    pub fn manager(&self) -> &Arc<BalancingUpstreamManager> {
        &self.manager
    }

    /// Send `request` to the upstream named by its host.
    pub async fn execute(&self, request: OutboundRequest, options: &RequestOptions) -> UpstreamResponse {
        let settings = self.manager.settings();
        let Some(host) = request.host().map(str::to_string) else {
            tracing::debug!(uri = %request.uri, "Request has no host");
            return UpstreamResponse::no_upstream();
        };

        match self.manager.get_upstream(&host, &options.profile) {
            Some(upstream) => {
                UpstreamRequestBalancer::new(
                    upstream,
                    request,
                    Arc::clone(&self.executor),
                    Arc::clone(self.manager.monitoring()),
                    options.adaptive,
                )
                .force_idempotence(options.force_idempotence)
                .timeout_multiplier(settings.timeout_multiplier)
                .request()
                .await
            }
            None if settings.allow_external_urls => {
                ExternalUrlRequestor::new(
                    request,
                    self.external_config.clone(),
                    Arc::clone(&self.executor),
                    Arc::clone(self.manager.monitoring()),
                )
                .force_idempotence(options.force_idempotence)
                .timeout_multiplier(settings.timeout_multiplier)
                .request()
                .await
            }
            None => {
                tracing::debug!(host = %host, "No upstream configured");
                UpstreamResponse::no_upstream()
            }
        }
    }
}
