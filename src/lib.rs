//! Client-side load balancing and retries for HTTP upstreams.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller
//!     │  OutboundRequest
//!     ▼
//!   ┌──────────────────┐   get_upstream    ┌──────────────────────────┐
//!   │ BalancingClient  │──────────────────▶│ BalancingUpstreamManager │◀── ServerStore / ConfigStore
//!   └────────┬─────────┘                   └────────────┬─────────────┘      (FileStore + ConfigWatcher)
//!            │                                          │
//!            ▼                                          ▼
//!   ┌──────────────────┐  acquire/release  ┌──────────────────────────┐
//!   │ RequestBalancer  │◀─────────────────▶│ Upstream (servers,       │
//!   │ (retry loop)     │                   │  configs, trackers)      │
//!   └────────┬─────────┘                   └──────────────────────────┘
//!            │ execute
//!            ▼
//!   RequestExecutor (HyperExecutor)          MonitoringSink (metrics)
//! ```

pub mod config;
pub mod health;
pub mod load_balancer;
pub mod manager;
pub mod observability;
pub mod request;
pub mod resilience;

pub use config::schema::{BalancerSettings, UpstreamConfig};
pub use load_balancer::{ServerDescriptor, Upstream};
pub use manager::BalancingUpstreamManager;
pub use request::{BalancingClient, HyperExecutor, OutboundRequest, RequestOptions, UpstreamResponse};
