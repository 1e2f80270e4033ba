//! Passive health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt completes (adaptive mode)
//!     → error:   downtime.rs (mark slot failed)
//!     → success: downtime.rs (mark slot healthy)
//!                response_time.rs (record latency sample)
//!
//! Adaptive selection reads:
//!     → DowntimeDetector::success_count()  (health score)
//!     → ResponseTimeTracker::mean()        (latency score)
//! ```
//!
//! # Design Decisions
//! - Fixed-size rings: memory per server is bounded and known upfront
//! - One mutex per tracker guards the ring and its running aggregate
//! - Aggregates are mirrored into atomics so readers never take the mutex
//! - Trackers never fail at runtime; invalid windows fail at construction

pub mod downtime;
pub mod response_time;

pub use downtime::DowntimeDetector;
pub use response_time::ResponseTimeTracker;

use thiserror::Error;

/// Errors raised while building a tracker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    /// The sliding window must hold at least one sample.
    #[error("sliding window size must be positive, got {0}")]
    InvalidWindow(usize),

    /// A percentage outside of `0..=100`.
    #[error("percentage must be within 0..=100, got {0}")]
    InvalidPercent(usize),
}
