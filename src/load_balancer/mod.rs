//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request for upstream X
//!     → upstream.rs (load current {configs, servers} state)
//!     → Apply selection strategy:
//!         - least_loaded.rs (static: fewest requests per weight unit)
//!         - adaptive.rs (weighted random by health and latency)
//!     → server.rs (count the request, hand out a ServerEntry)
//!
//! Attempt finished
//!     → upstream.rs (validate entry against the current list)
//!     → server.rs (update counters or trackers)
//!     → scheduler.rs (bring a deactivated server back later)
//! ```
//!
//! # Design Decisions
//! - Strategies are pure functions over a server snapshot
//! - Upstream state is swapped atomically; selection never takes a lock
//! - Inactive and cross-DC servers are excluded before ranking

pub mod adaptive;
pub mod least_loaded;
pub mod scheduler;
pub mod server;
pub mod upstream;

pub use scheduler::{ReactivationScheduler, TokioScheduler};
pub use server::{Server, ServerDescriptor, ServerEntry, ServerError, TrackerWindows};
pub use upstream::{ProfiledUpstream, Upstream, UpstreamSnapshot};
