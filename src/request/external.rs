//! Retry loop for hosts that are not registered upstreams.
//!
//! The request goes to its literal host on every attempt; there are no
//! servers to select or release.

use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::{UpstreamConfig, DEFAULT_PROFILE};
use crate::observability::metrics::MonitoringSink;
use crate::request::balancer::{AttemptHooks, AttemptTarget, RequestBalancer};
use crate::request::executor::{RequestContext, RequestExecutor};
use crate::request::types::{OutboundRequest, UpstreamResponse};
use crate::resilience::RetryBudget;

/// Hooks that always target the request's own host.
#[derive(Debug)]
pub struct ExternalAttempts {
    host: String,
    config: UpstreamConfig,
}

impl ExternalAttempts {
    pub fn new(host: impl Into<String>, config: UpstreamConfig) -> Self {
        Self {
            host: host.into(),
            config,
        }
    }
}

impl AttemptHooks for ExternalAttempts {
    fn upstream_name(&self) -> &str {
        &self.host
    }

    fn datacenter(&self) -> Option<&str> {
        None
    }

    fn initial_budget(&self) -> RetryBudget {
        RetryBudget::new(self.config.max_tries, self.config.total_timeout())
    }

    fn request_timeout(&self) -> Duration {
        self.config.request_timeout()
    }

    fn connect_timeout(&self) -> Option<Duration> {
        Some(self.config.connect_timeout())
    }

    fn resolve_target(&mut self, request: &OutboundRequest) -> Result<AttemptTarget, UpstreamResponse> {
        Ok(AttemptTarget {
            request: request.clone(),
            server: None,
            address: self.host.clone(),
        })
    }

    fn is_server_error(&self, response: &UpstreamResponse) -> bool {
        self.config.retry_policy.is_server_error(response)
    }

    fn check_retry(&self, response: &UpstreamResponse, idempotent: bool) -> bool {
        self.config.retry_policy.is_retriable(response, idempotent)
    }
}

/// Retry loop against a literal URL.
pub type ExternalUrlRequestor = RequestBalancer<ExternalAttempts>;

impl RequestBalancer<ExternalAttempts> {
    /// `config` supplies tries, timeouts and the retry policy.
    pub fn new(
        request: OutboundRequest,
        config: UpstreamConfig,
        executor: Arc<dyn RequestExecutor>,
        monitoring: Arc<dyn MonitoringSink>,
    ) -> Self {
        let host = request
            .uri
            .authority()
            .map(|authority| authority.to_string())
            .unwrap_or_default();
        let context = RequestContext::new(host.clone(), DEFAULT_PROFILE);
        RequestBalancer::with_hooks(
            ExternalAttempts::new(host, config),
            request,
            executor,
            monitoring,
            context,
        )
    }
}
