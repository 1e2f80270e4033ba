//! Request subsystem.
//!
//! # Data Flow
//! ```text
//! BalancingClient::execute(request)
//!     → manager.get_upstream(host)
//!     → upstream_balancer.rs (registered upstream) or external.rs (literal host)
//!     → balancer.rs loop:
//!         resolve target → retarget URI → executor.rs → release → retry?
//!     → final UpstreamResponse
//! ```
//!
//! # Design Decisions
//! - The executor is a trait; hyper_executor.rs is the bundled transport
//! - Transport failures are responses (599), never errors
//! - Each logical request carries a UUID v4 request id

pub mod balancer;
pub mod client;
pub mod executor;
pub mod external;
pub mod hyper_executor;
pub mod types;
pub mod upstream_balancer;

pub use balancer::{AttemptHooks, AttemptState, AttemptTarget, RequestBalancer};
pub use client::{BalancingClient, RequestOptions};
pub use executor::{RequestContext, RequestExecutor};
pub use external::ExternalUrlRequestor;
pub use hyper_executor::HyperExecutor;
pub use types::{OutboundRequest, ResponseWithTiming, UpstreamResponse};
pub use upstream_balancer::UpstreamRequestBalancer;
