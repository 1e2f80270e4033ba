//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt completes:
//!     → retry_policy.rs (is the response retriable? does it penalize the server?)
//!     → budget.rs (charge the attempt; any tries and time left?)
//!     → both yes: retry on another server
//! ```
//!
//! # Design Decisions
//! - Non-idempotent requests are retried only for explicitly allowed statuses
//! - Connection failures are always retryable
//! - Every request is bounded by both a try count and a time budget
//! - No backoff between attempts: the next attempt goes to a different server

pub mod budget;
pub mod retry_policy;

pub use budget::RetryBudget;
pub use retry_policy::RetryPolicy;
