//! Retry loop over the servers of an upstream.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::UpstreamConfig;
use crate::load_balancer::server::ServerEntry;
use crate::load_balancer::upstream::ProfiledUpstream;
use crate::observability::metrics::MonitoringSink;
use crate::request::balancer::{AttemptHooks, AttemptTarget, RequestBalancer};
use crate::request::executor::{RequestContext, RequestExecutor};
use crate::request::types::{OutboundRequest, ResponseWithTiming, UpstreamResponse};
use crate::resilience::RetryBudget;

/// Hooks selecting servers from an upstream and reporting outcomes back to it.
#[derive(Debug)]
pub struct UpstreamAttempts {
    upstream: ProfiledUpstream,
    config: Arc<UpstreamConfig>,
    adaptive: bool,
    tried: HashSet<usize>,
    /// Server order for adaptive requests, computed on the first attempt.
    plan: Option<VecDeque<ServerEntry>>,
}

impl UpstreamAttempts {
    pub fn new(upstream: ProfiledUpstream, adaptive: bool) -> Self {
        let config = upstream.config();
        Self {
            upstream,
            config,
            adaptive,
            tried: HashSet::new(),
            plan: None,
        }
    }
}

impl AttemptHooks for UpstreamAttempts {
    fn upstream_name(&self) -> &str {
        self.upstream.upstream().name()
    }

    fn datacenter(&self) -> Option<&str> {
        self.upstream.upstream().datacenter()
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
        let upstream = self.upstream.upstream();
        if !upstream.is_enabled() {
            tracing::debug!(upstream = %upstream.name(), "Upstream disabled");
            return Err(UpstreamResponse::no_available_servers());
        }

        let entry = if self.adaptive {
            let max_tries = self.config.max_tries.max(1) as usize;
            self.plan
                .get_or_insert_with(|| upstream.acquire_adaptive_servers(max_tries).into())
                .pop_front()
        } else {
            upstream.acquire_server(&self.tried)
        };

        let Some(entry) = entry else {
            tracing::debug!(upstream = %upstream.name(), tried = self.tried.len(), "No server available");
            return Err(UpstreamResponse::no_available_servers());
        };

        Ok(AttemptTarget {
            request: request.retarget(&entry.scheme, &entry.authority),
            address: entry.address.clone(),
            server: Some(entry),
        })
    }

    fn on_attempt_complete(&mut self, target: &AttemptTarget, result: &ResponseWithTiming, is_error: bool) {
        if let Some(entry) = &target.server {
            self.upstream
                .release_server(entry, is_error, result.elapsed_micros(), self.adaptive);
        }
    }

    fn is_server_error(&self, response: &UpstreamResponse) -> bool {
        self.config.retry_policy.is_server_error(response)
    }

    fn check_retry(&self, response: &UpstreamResponse, idempotent: bool) -> bool {
        self.config.retry_policy.is_retriable(response, idempotent)
    }

    fn on_retry_decided(&mut self, target: &AttemptTarget, will_retry: bool) {
        if let (true, Some(entry)) = (will_retry, &target.server) {
            self.tried.insert(entry.index);
        }
    }
}

/// Retry loop bound to an upstream.
pub type UpstreamRequestBalancer = RequestBalancer<UpstreamAttempts>;

impl RequestBalancer<UpstreamAttempts> {
    pub fn new(
        upstream: ProfiledUpstream,
        request: OutboundRequest,
        executor: Arc<dyn RequestExecutor>,
        monitoring: Arc<dyn MonitoringSink>,
        adaptive: bool,
    ) -> Self {
        let context = RequestContext::new(upstream.upstream().name(), upstream.profile());
        RequestBalancer::with_hooks(
            UpstreamAttempts::new(upstream, adaptive),
            request,
            executor,
            monitoring,
            context,
        )
    }
}
