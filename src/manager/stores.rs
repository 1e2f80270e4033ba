//! Discovery seams: where servers and upstream configs come from.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::config::schema::UpstreamConfig;
use crate::load_balancer::server::ServerDescriptor;

/// Source of server lists.
pub trait ServerStore: Send + Sync + Debug {
    fn get_servers(&self, upstream: &str) -> Vec<ServerDescriptor>;

    /// Server count the upstream is expected to start with, if known.
    fn get_initial_size(&self, upstream: &str) -> Option<usize>;
}

/// Source of per-profile upstream configs.
pub trait ConfigStore: Send + Sync + Debug {
    /// Profile map of `upstream`, or `None` when it is not configured.
    fn get_upstream_config(&self, upstream: &str) -> Option<HashMap<String, UpstreamConfig>>;

    /// Whether `upstream` should serve requests. Applied on every update.
    fn is_upstream_enabled(&self, _upstream: &str) -> bool {
        true
    }
}
