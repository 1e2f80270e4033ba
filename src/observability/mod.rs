//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Balancer produces:
//!     → logging.rs (structured log events, request id spans)
//!     → metrics.rs (MonitoringSink: attempts, retries, ignored updates)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every attempt of a request
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{install_prometheus_exporter, MetricsMonitoring, MonitoringSink, NoopMonitoring};
