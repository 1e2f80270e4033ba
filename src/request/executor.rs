//! Transport seam.

use std::fmt::Debug;

use async_trait::async_trait;
use uuid::Uuid;

use crate::request::types::{OutboundRequest, ResponseWithTiming};

/// Identity of one logical request, shared by all of its attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Uuid,
    /// Upstream name, or the literal host for external requests.
    pub upstream: String,
    pub profile: String,
}

impl RequestContext {
    pub fn new(upstream: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            upstream: upstream.into(),
            profile: profile.into(),
        }
    }
}

/// Sends one attempt and reports how long it took.
///
/// Implementations never fail: transport problems come back as synthetic
/// responses (status 599 for connect failures and timeouts).
#[async_trait]
pub trait RequestExecutor: Send + Sync + Debug {
    async fn execute(&self, request: OutboundRequest, attempt: u32, context: &RequestContext) -> ResponseWithTiming;
}
