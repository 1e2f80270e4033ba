//! Upstream registry.
//!
//! # Data Flow
//! ```text
//! update_upstreams(names)
//!     → stores.rs (ServerStore::get_servers, ConfigStore::get_upstream_config)
//!     → upstream_manager.rs (degradation and local-DC checks)
//!     → Upstream::update_config (atomic swap) or new Upstream
//!
//! get_upstream(name, profile)
//!     → strip scheme://
//!     → ProfiledUpstream
//! ```

pub mod stores;
pub mod upstream_manager;

pub use stores::{ConfigStore, ServerStore};
pub use upstream_manager::{BalancingUpstreamManager, UpdateError};
