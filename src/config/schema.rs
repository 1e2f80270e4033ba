//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure of the balancer.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load_balancer::server::ServerDescriptor;
use crate::resilience::RetryPolicy;

/// Profile used when a caller does not name one.
pub const DEFAULT_PROFILE: &str = "default";

/// Root of a balancer configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FileConfig {
    /// Process-wide balancing settings.
    pub balancer: BalancerSettings,

    /// Upstreams by name.
    pub upstreams: HashMap<String, UpstreamEntry>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Process-wide balancing settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BalancerSettings {
    /// Datacenter this process runs in. Matched case-insensitively.
    pub datacenter: Option<String>,

    /// Allow routing to servers outside `datacenter`.
    pub allow_cross_dc: bool,

    /// Share of the last known server count an update may lose (0.0 - 1.0).
    pub allowed_degradation_part: f64,

    /// Reject updates that leave no server in `datacenter`.
    pub skip_update_without_local_dc: bool,

    /// Surface rejected updates as errors instead of only logging them.
    pub fail_on_ignored_update: bool,

    /// Factor applied to every attempt timeout.
    pub timeout_multiplier: f64,

    /// Send requests for unknown hosts directly instead of failing them.
    pub allow_external_urls: bool,
}

impl Default for BalancerSettings {
    fn default() -> Self {
        Self {
            datacenter: None,
            allow_cross_dc: false,
            allowed_degradation_part: 0.5,
            skip_update_without_local_dc: false,
            fail_on_ignored_update: false,
            timeout_multiplier: 1.0,
            allow_external_urls: true,
        }
    }
}

/// Profiles and servers of one upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamEntry {
    /// A disabled upstream answers every request with 502 without trying a server.
    pub enabled: bool,

    /// Per-profile settings. A missing `default` profile uses built-in defaults.
    pub profiles: HashMap<String, UpstreamConfig>,

    pub servers: Vec<ServerDescriptor>,
}

impl Default for UpstreamEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            profiles: HashMap::new(),
            servers: Vec::new(),
        }
    }
}

/// Settings of one upstream profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Attempts per request, including the first.
    pub max_tries: u32,

    /// Request timeouts a request may spend; bounds its total time budget.
    pub max_timeout_tries: u32,

    /// Consecutive failures that take a server out of rotation (0 disables).
    pub max_fails: u32,

    /// How long a failed server stays out of rotation.
    pub fail_timeout_ms: u64,

    pub connect_timeout_ms: u64,

    /// Timeout of a single attempt.
    pub request_timeout_ms: u64,

    /// Weight ramp-up for servers joining a running upstream (0 disables).
    pub slow_start_interval_sec: u64,

    pub retry_policy: RetryPolicy,
}

impl UpstreamConfig {
    pub fn fail_timeout(&self) -> Duration {
        Duration::from_millis(self.fail_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn slow_start_interval(&self) -> Duration {
        Duration::from_secs(self.slow_start_interval_sec)
    }

    /// Total time one logical request may spend across attempts.
    pub fn total_timeout(&self) -> Duration {
        self.request_timeout() * self.max_timeout_tries.max(1)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            max_tries: 2,
            max_timeout_tries: 1,
            max_fails: 1,
            fail_timeout_ms: 10_000,
            connect_timeout_ms: 200,
            request_timeout_ms: 2_000,
            slow_start_interval_sec: 0,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub log_json: bool,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
