//! Retry eligibility.
//!
//! # Responsibilities
//! - Map response status codes to retry eligibility
//! - Distinguish statuses retried for any method from idempotent-only ones
//! - Decide whether a response penalizes the server that produced it
//!
//! # Design Decisions
//! - Connection failures are always retryable: the request never reached the server
//! - Unlisted statuses are final and do not count against the server

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::request::types::{status, UpstreamResponse};

/// `status code → retry even if not idempotent`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "BTreeMap<String, bool>", into = "BTreeMap<String, bool>")]
pub struct RetryPolicy {
    rules: HashMap<u16, bool>,
}

impl RetryPolicy {
    /// Policy without any rules: only connection failures are retried.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Add or replace a rule.
    pub fn with_rule(mut self, status: u16, retry_non_idempotent: bool) -> Self {
        self.rules.insert(status, retry_non_idempotent);
        self
    }

    pub fn rule(&self, status: u16) -> Option<bool> {
        self.rules.get(&status).copied()
    }

    /// True if another attempt may be made after `response`.
    pub fn is_retriable(&self, response: &UpstreamResponse, idempotent: bool) -> bool {
        if response.is_connect_error() {
            return true;
        }
        match self.rules.get(&response.status) {
            Some(&retry_non_idempotent) => retry_non_idempotent || idempotent,
            None => false,
        }
    }

    /// True if `response` should count as a failure of the server.
    pub fn is_server_error(&self, response: &UpstreamResponse) -> bool {
        response.is_connect_error() || self.rules.contains_key(&response.status)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::empty()
            .with_rule(status::CONNECT_TIMEOUT_ERROR, false)
            .with_rule(status::SERVICE_UNAVAILABLE, false)
    }
}

impl TryFrom<BTreeMap<String, bool>> for RetryPolicy {
    type Error = String;

    fn try_from(raw: BTreeMap<String, bool>) -> Result<Self, Self::Error> {
        let mut rules = HashMap::with_capacity(raw.len());
        for (code, retry_non_idempotent) in raw {
            let parsed: u16 = code
                .trim()
                .parse()
                .map_err(|_| format!("invalid status code '{}' in retry policy", code))?;
            if !(100..=599).contains(&parsed) {
                return Err(format!("status code {} out of range in retry policy", parsed));
            }
            rules.insert(parsed, retry_non_idempotent);
        }
        Ok(Self { rules })
    }
}

impl From<RetryPolicy> for BTreeMap<String, bool> {
    fn from(policy: RetryPolicy) -> Self {
        policy
            .rules
            .into_iter()
            .map(|(code, retry)| (code.to_string(), retry))
            .collect()
    }
}
