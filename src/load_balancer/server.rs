//! Server abstraction.
//!
//! # Responsibilities
//! - Represent a single backend instance of an upstream
//! - Track in-flight and cumulative requests (for least-loaded selection)
//! - Track consecutive failures and the active flag
//! - Own the health and latency windows (for adaptive selection)

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use hyper::http::uri::{Authority, Scheme};
use hyper::Uri;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::health::{DowntimeDetector, ResponseTimeTracker, TrackerError};

/// Window of the per-server downtime detector.
pub const DOWNTIME_DETECTOR_WINDOW: usize = 100;
/// Window of the per-server response time tracker.
pub const RESPONSE_TIME_TRACKER_WINDOW: usize = 500;
/// Healthy share of the downtime window for a server that is slow-starting.
pub const SLOW_START_LIVE_PERCENT: usize = 10;

/// Errors raised while building a server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid server address '{0}'")]
    InvalidAddress(String),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

/// Server as published by a server store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ServerDescriptor {
    /// Address, either `host:port` or `scheme://host:port`.
    pub address: String,

    /// Relative capacity (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    #[serde(default)]
    pub rack: Option<String>,

    #[serde(default)]
    pub datacenter: Option<String>,
}

fn default_weight() -> u32 {
    1
}

impl ServerDescriptor {
    pub fn new(address: impl Into<String>, weight: u32) -> Self {
        Self {
            address: address.into(),
            weight,
            rack: None,
            datacenter: None,
        }
    }

    pub fn with_rack(mut self, rack: impl Into<String>) -> Self {
        self.rack = Some(rack.into());
        self
    }

    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }
}

/// Parse a server address into the scheme and authority used for request rewriting.
pub fn parse_address(address: &str) -> Result<(Scheme, Authority), ServerError> {
    let invalid = || ServerError::InvalidAddress(address.to_string());

    let uri: Uri = if address.contains("://") {
        address.parse().map_err(|_| invalid())?
    } else {
        format!("http://{}", address).parse().map_err(|_| invalid())?
    };

    let scheme = uri.scheme().cloned().ok_or_else(invalid)?;
    let authority = uri.authority().cloned().ok_or_else(invalid)?;
    Ok((scheme, authority))
}

/// Window sizes used when building server trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerWindows {
    pub downtime: usize,
    pub response_time: usize,
}

impl Default for TrackerWindows {
    fn default() -> Self {
        Self {
            downtime: DOWNTIME_DETECTOR_WINDOW,
            response_time: RESPONSE_TIME_TRACKER_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SlowStart {
    started: Instant,
    interval: Duration,
}

/// A single backend server.
#[derive(Debug)]
pub struct Server {
    address: String,
    scheme: Scheme,
    authority: Authority,
    weight: u32,
    rack: Option<String>,
    datacenter: Option<String>,
    slow_start: Option<SlowStart>,

    active: AtomicBool,
    /// Requests currently in flight.
    requests: AtomicU32,
    /// Requests ever acquired, minus periodic rescaling.
    stats_requests: AtomicU32,
    /// Consecutive failures.
    fails: AtomicU32,

    downtime_detector: DowntimeDetector,
    response_time_tracker: ResponseTimeTracker,
}

impl Server {
    /// Create a server from its descriptor.
    pub fn new(descriptor: &ServerDescriptor, windows: TrackerWindows) -> Result<Self, ServerError> {
        Self::build(descriptor, windows, None)
    }

    /// Create a server that ramps up its weight over `interval`.
    pub fn slow_starting(
        descriptor: &ServerDescriptor,
        windows: TrackerWindows,
        interval: Duration,
    ) -> Result<Self, ServerError> {
        Self::build(
            descriptor,
            windows,
            Some(SlowStart {
                started: Instant::now(),
                interval,
            }),
        )
    }

    fn build(
        descriptor: &ServerDescriptor,
        windows: TrackerWindows,
        slow_start: Option<SlowStart>,
    ) -> Result<Self, ServerError> {
        let (scheme, authority) = parse_address(&descriptor.address)?;
        let downtime_detector = match slow_start {
            Some(_) => DowntimeDetector::with_live_percent(windows.downtime, SLOW_START_LIVE_PERCENT)?,
            None => DowntimeDetector::new(windows.downtime)?,
        };

        Ok(Self {
            address: descriptor.address.clone(),
            scheme,
            authority,
            weight: descriptor.weight.max(1),
            rack: descriptor.rack.clone(),
            datacenter: descriptor.datacenter.as_deref().map(str::to_lowercase),
            slow_start,
            active: AtomicBool::new(true),
            requests: AtomicU32::new(0),
            stats_requests: AtomicU32::new(0),
            fails: AtomicU32::new(0),
            downtime_detector,
            response_time_tracker: ResponseTimeTracker::new(windows.response_time)?,
        })
    }

    /// True when this server was built from `descriptor`.
    pub fn matches(&self, descriptor: &ServerDescriptor) -> bool {
        self.address == descriptor.address
            && self.weight == descriptor.weight.max(1)
            && self.rack == descriptor.rack
            && self.datacenter.as_deref() == descriptor.datacenter.as_deref().map(str::to_lowercase).as_deref()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Weight used for load comparison: ramps linearly from 1 during slow start.
    pub fn effective_weight(&self, now: Instant) -> u32 {
        match self.slow_start {
            Some(slow_start) if !slow_start.interval.is_zero() => {
                let elapsed = now.saturating_duration_since(slow_start.started);
                if elapsed >= slow_start.interval {
                    return self.weight;
                }
                let ratio = elapsed.as_secs_f64() / slow_start.interval.as_secs_f64();
                ((self.weight as f64 * ratio) as u32).max(1)
            }
            _ => self.weight,
        }
    }

    pub fn rack(&self) -> Option<&str> {
        self.rack.as_deref()
    }

    pub fn datacenter(&self) -> Option<&str> {
        self.datacenter.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn stats_requests(&self) -> u32 {
        self.stats_requests.load(Ordering::Relaxed)
    }

    pub fn fails(&self) -> u32 {
        self.fails.load(Ordering::Relaxed)
    }

    pub fn downtime_detector(&self) -> &DowntimeDetector {
        &self.downtime_detector
    }

    pub fn response_time_tracker(&self) -> &ResponseTimeTracker {
        &self.response_time_tracker
    }

    /// Count a request routed to this server.
    pub fn acquire(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.stats_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Finish a request. Returns the consecutive failure count after the update.
    pub fn release(&self, is_error: bool) -> u32 {
        let _ = self
            .requests
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));

        if is_error {
            self.fails.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            self.fails.store(0, Ordering::Relaxed);
            0
        }
    }

    /// Feed an attempt outcome into the health and latency windows.
    pub fn record_outcome(&self, is_error: bool, response_time_micros: u64) {
        if is_error {
            self.downtime_detector.failed();
        } else {
            self.downtime_detector.success();
            self.response_time_tracker.time(response_time_micros);
        }
    }

    /// Take the server out of rotation. Returns false if it was already inactive.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    /// Put the server back into rotation with a clean failure count.
    pub fn activate(&self) {
        self.fails.store(0, Ordering::Relaxed);
        if !self.active.swap(true, Ordering::AcqRel) {
            tracing::info!(server = %self.address, "Server reactivated");
        }
    }

    /// Subtract one weight unit from the cumulative counter.
    ///
    /// Callers check `stats_requests() >= weight()` first and serialize the
    /// check with the subtraction; a counter below its weight is left as is.
    pub fn rescale_stats_requests(&self) {
        let weight = self.weight;
        let _ = self
            .stats_requests
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(weight));
    }
}

/// Immutable snapshot of a selected server.
///
/// `index` points into the upstream's server list at selection time; the list
/// may be swapped before release, so it is validated again on release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub index: usize,
    pub address: String,
    pub scheme: Scheme,
    pub authority: Authority,
    pub datacenter: Option<String>,
    pub rack: Option<String>,
}

impl ServerEntry {
    pub fn new(index: usize, server: &Server) -> Self {
        Self {
            index,
            address: server.address.clone(),
            scheme: server.scheme.clone(),
            authority: server.authority.clone(),
            datacenter: server.datacenter.clone(),
            rack: server.rack.clone(),
        }
    }
}
