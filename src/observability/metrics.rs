//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the monitoring sink the balancer reports to
//! - Record balancer metrics through the `metrics` facade
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `upstream_requests_total` (counter): attempts by upstream, datacenter, server, status, final
//! - `upstream_request_duration_seconds` (histogram): attempt latency
//! - `upstream_retries_total` (counter): requests that needed more than one attempt
//! - `upstream_update_ignored_total` (counter): rejected server-list updates
//!
//! # Design Decisions
//! - The sink is a trait so callers can plug in their own reporting
//! - Metric updates go through the global recorder; no recorder means no cost

use std::fmt::Debug;
use std::net::SocketAddr;

use metrics::Label;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Receiver of per-attempt and per-update statistics.
pub trait MonitoringSink: Send + Sync + Debug {
    /// One attempt finished. `is_final` marks the attempt whose response is returned.
    fn count_request(
        &self,
        upstream: &str,
        datacenter: Option<&str>,
        server: &str,
        status: u16,
        latency_micros: u64,
        is_final: bool,
    );

    /// A request finished after `retry_count` retries.
    fn count_retry(
        &self,
        upstream: &str,
        datacenter: Option<&str>,
        server: &str,
        status: u16,
        first_status: u16,
        retry_count: u32,
    );

    /// A server-list update was rejected.
    fn count_update_ignore(&self, upstream: &str, datacenter: Option<&str>);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitoring;

impl MonitoringSink for NoopMonitoring {
    fn count_request(&self, _: &str, _: Option<&str>, _: &str, _: u16, _: u64, _: bool) {}

    fn count_retry(&self, _: &str, _: Option<&str>, _: &str, _: u16, _: u16, _: u32) {}

    fn count_update_ignore(&self, _: &str, _: Option<&str>) {}
}

/// Sink backed by the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsMonitoring;

impl MonitoringSink for MetricsMonitoring {
    fn count_request(
        &self,
        upstream: &str,
        datacenter: Option<&str>,
        server: &str,
        status: u16,
        latency_micros: u64,
        is_final: bool,
    ) {
        let labels = attempt_labels(upstream, datacenter, server, status);
        let mut counter_labels = labels.clone();
        counter_labels.push(Label::new("final", is_final.to_string()));

        metrics::counter!("upstream_requests_total", counter_labels).increment(1);
        metrics::histogram!("upstream_request_duration_seconds", labels)
            .record(latency_micros as f64 / 1_000_000.0);
    }

    fn count_retry(
        &self,
        upstream: &str,
        datacenter: Option<&str>,
        server: &str,
        status: u16,
        first_status: u16,
        retry_count: u32,
    ) {
        let mut labels = attempt_labels(upstream, datacenter, server, status);
        labels.push(Label::new("first_status", first_status.to_string()));
        metrics::counter!("upstream_retries_total", labels).increment(retry_count as u64);
    }

    fn count_update_ignore(&self, upstream: &str, datacenter: Option<&str>) {
        metrics::counter!(
            "upstream_update_ignored_total",
            "upstream" => upstream.to_string(),
            "datacenter" => datacenter.unwrap_or_default().to_string()
        )
        .increment(1);
    }
}

fn attempt_labels(upstream: &str, datacenter: Option<&str>, server: &str, status: u16) -> Vec<Label> {
    vec![
        Label::new("upstream", upstream.to_string()),
        Label::new("datacenter", datacenter.unwrap_or_default().to_string()),
        Label::new("server", server.to_string()),
        Label::new("status", status.to_string()),
    ]
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn install_prometheus_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}
