//! Per-request retry loop.
//!
//! # Responsibilities
//! - Drive the attempts of one logical request
//! - Bound attempts by the retry budget (tries and time)
//! - Report every attempt and the final retry count to the monitoring sink
//!
//! # Design Decisions
//! - One driver, specialised by an [`AttemptHooks`] implementation; upstream
//!   and external requests only differ in how targets are resolved and
//!   released
//! - Attempts are strictly sequential; no backoff between them
//! - The loop never fails: every outcome is a response

use std::sync::Arc;
use std::time::Duration;

use hyper::Method;
use tracing::Instrument;

use crate::observability::metrics::MonitoringSink;
use crate::load_balancer::server::ServerEntry;
use crate::request::executor::{RequestContext, RequestExecutor};
use crate::request::types::{OutboundRequest, ResponseWithTiming, UpstreamResponse};
use crate::resilience::RetryBudget;

/// Where one attempt goes.
#[derive(Debug, Clone)]
pub struct AttemptTarget {
    /// Request rewritten for the target.
    pub request: OutboundRequest,
    /// Selected server, when the target came from an upstream.
    pub server: Option<ServerEntry>,
    /// Address reported to monitoring.
    pub address: String,
}

/// Points where request kinds customise the retry loop.
pub trait AttemptHooks: Send {
    fn upstream_name(&self) -> &str;

    fn datacenter(&self) -> Option<&str>;

    /// Budget for the whole request.
    fn initial_budget(&self) -> RetryBudget;

    /// Timeout of a single attempt before budget capping.
    fn request_timeout(&self) -> Duration;

    /// Bound on connection setup for every attempt, if the request kind has one.
    fn connect_timeout(&self) -> Option<Duration> {
        None
    }

    /// Choose the target of the next attempt, or the response to return
    /// when there is none.
    fn resolve_target(&mut self, request: &OutboundRequest) -> Result<AttemptTarget, UpstreamResponse>;

    fn on_attempt_start(&mut self, _target: &AttemptTarget) {}

    /// Attempt finished; `is_error` says whether it counts against the target.
    fn on_attempt_complete(&mut self, _target: &AttemptTarget, _result: &ResponseWithTiming, _is_error: bool) {}

    fn is_server_error(&self, response: &UpstreamResponse) -> bool;

    /// Whether the response allows another attempt, budget aside.
    fn check_retry(&self, response: &UpstreamResponse, idempotent: bool) -> bool;

    fn on_retry_decided(&mut self, _target: &AttemptTarget, _will_retry: bool) {}
}

/// Progress of a request through the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    NotStarted,
    ServerAcquired,
    AwaitingResponse,
    Retry,
    Terminal,
}

/// Generic retry driver.
pub struct RequestBalancer<H> {
    hooks: H,
    request: OutboundRequest,
    executor: Arc<dyn RequestExecutor>,
    monitoring: Arc<dyn MonitoringSink>,
    context: RequestContext,
    force_idempotence: bool,
    timeout_multiplier: f64,
    state: AttemptState,
}

impl<H: AttemptHooks> RequestBalancer<H> {
    pub fn with_hooks(
        hooks: H,
        request: OutboundRequest,
        executor: Arc<dyn RequestExecutor>,
        monitoring: Arc<dyn MonitoringSink>,
        context: RequestContext,
    ) -> Self {
        Self {
            hooks,
            request,
            executor,
            monitoring,
            context,
            force_idempotence: false,
            timeout_multiplier: 1.0,
            state: AttemptState::NotStarted,
        }
    }

    /// Treat the request as idempotent regardless of its method.
    pub fn force_idempotence(mut self, force: bool) -> Self {
        self.force_idempotence = force;
        self
    }

    /// Scale attempt timeouts. Values that are not finite and positive are
    /// ignored and the timeouts stay unscaled.
    pub fn timeout_multiplier(mut self, multiplier: f64) -> Self {
        if multiplier.is_finite() && multiplier > 0.0 {
            self.timeout_multiplier = multiplier;
        } else {
            tracing::warn!(multiplier, "Ignoring invalid timeout multiplier");
        }
        self
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    fn is_idempotent(&self) -> bool {
        self.force_idempotence || self.request.method != Method::POST
    }

    /// Run attempts until a response is final.
    pub async fn request(mut self) -> UpstreamResponse {
        let span = tracing::debug_span!(
            "balanced_request",
            request_id = %self.context.request_id,
            upstream = %self.hooks.upstream_name()
        );
        self.run().instrument(span).await
    }

    async fn run(&mut self) -> UpstreamResponse {
        let idempotent = self.is_idempotent();
        let mut budget = self.hooks.initial_budget();
        let mut retries: u32 = 0;
        let mut first_status: Option<u16> = None;
        let mut last_address: Option<String> = None;

        loop {
            let target = match self.hooks.resolve_target(&self.request) {
                Ok(target) => target,
                Err(response) => {
                    tracing::debug!(status = response.status, retries, "No target for attempt");
                    self.finish(&response, retries, first_status, last_address.as_deref());
                    return response;
                }
            };
            self.state = AttemptState::ServerAcquired;

            let mut outbound = target.request.clone();
            outbound.timeout = Some(budget.attempt_timeout(self.hooks.request_timeout(), self.timeout_multiplier));
            outbound.connect_timeout = self.hooks.connect_timeout().or(outbound.connect_timeout);

            self.hooks.on_attempt_start(&target);
            self.state = AttemptState::AwaitingResponse;
            let result = self.executor.execute(outbound, retries, &self.context).await;

            budget.record_attempt(result.elapsed);
            let is_error = self.hooks.is_server_error(&result.response);
            self.hooks.on_attempt_complete(&target, &result, is_error);

            let status = result.response.status;
            first_status.get_or_insert(status);
            let will_retry = budget.can_retry() && self.hooks.check_retry(&result.response, idempotent);

            self.monitoring.count_request(
                self.hooks.upstream_name(),
                self.hooks.datacenter(),
                &target.address,
                status,
                result.elapsed_micros(),
                !will_retry,
            );
            self.hooks.on_retry_decided(&target, will_retry);

            if !will_retry {
                self.finish(&result.response, retries, first_status, Some(&target.address));
                return result.response;
            }

            tracing::debug!(
                server = %target.address,
                status,
                tries_left = budget.tries_left(),
                time_left_ms = budget.time_left().as_millis() as u64,
                "Retrying request"
            );
            self.state = AttemptState::Retry;
            retries += 1;
            last_address = Some(target.address);
        }
    }

    fn finish(&mut self, response: &UpstreamResponse, retries: u32, first_status: Option<u16>, address: Option<&str>) {
        self.state = AttemptState::Terminal;
        if retries == 0 {
            return;
        }
        self.monitoring.count_retry(
            self.hooks.upstream_name(),
            self.hooks.datacenter(),
            address.unwrap_or_default(),
            response.status,
            first_status.unwrap_or(response.status),
            retries,
        );
    }
}

impl<H> std::fmt::Debug for RequestBalancer<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBalancer")
            .field("request_id", &self.context.request_id)
            .field("upstream", &self.context.upstream)
            .field("state", &self.state)
            .finish()
    }
}
