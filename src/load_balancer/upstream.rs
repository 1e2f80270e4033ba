//! Upstream: one logical service and its servers.
//!
//! # Responsibilities
//! - Own the server list and per-profile configs of one service
//! - Hand out servers for attempts and take back their outcomes
//! - Deactivate failing servers and schedule their return
//! - Keep cumulative counters bounded (rescaling)
//!
//! # Design Decisions
//! - Servers and configs are published together as one immutable state
//!   behind an atomic pointer swap; a reader sees either the old pair or the
//!   new pair, never a mix
//! - A released entry is validated against the current list by index and
//!   address, so outcomes for replaced servers are dropped
//! - Unchanged servers keep their object (and counters) across updates
//! - Rescaling is serialized per upstream so the check and the subtraction
//!   of one pass cannot interleave with another pass

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::schema::{UpstreamConfig, DEFAULT_PROFILE};
use crate::load_balancer::adaptive;
use crate::load_balancer::least_loaded::{self, is_different_dc};
use crate::load_balancer::scheduler::{ReactivationScheduler, TokioScheduler};
use crate::load_balancer::server::{Server, ServerDescriptor, ServerEntry, ServerError, TrackerWindows};

/// Servers and configs published as a unit.
#[derive(Debug, Default)]
struct UpstreamState {
    configs: HashMap<String, Arc<UpstreamConfig>>,
    servers: Vec<Arc<Server>>,
}

impl UpstreamState {
    fn config(&self, profile: &str) -> Option<Arc<UpstreamConfig>> {
        self.configs
            .get(profile)
            .or_else(|| self.configs.get(DEFAULT_PROFILE))
            .cloned()
    }
}

/// One logical service.
#[derive(Debug)]
pub struct Upstream {
    name: String,
    datacenter: Option<String>,
    allow_cross_dc: bool,
    enabled: AtomicBool,
    windows: TrackerWindows,
    state: ArcSwap<UpstreamState>,
    scheduler: Arc<dyn ReactivationScheduler>,
    rescale_lock: Mutex<()>,
}

impl Upstream {
    /// Create an empty upstream. Servers arrive through [`Upstream::update_config`].
    pub fn new(name: impl Into<String>, datacenter: Option<&str>, allow_cross_dc: bool) -> Self {
        Self {
            name: name.into(),
            datacenter: datacenter.map(str::to_lowercase),
            allow_cross_dc,
            enabled: AtomicBool::new(true),
            windows: TrackerWindows::default(),
            state: ArcSwap::from_pointee(UpstreamState::default()),
            scheduler: Arc::new(TokioScheduler),
            rescale_lock: Mutex::new(()),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn ReactivationScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_tracker_windows(mut self, windows: TrackerWindows) -> Self {
        self.windows = windows;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datacenter(&self) -> Option<&str> {
        self.datacenter.as_deref()
    }

    pub fn allow_cross_dc(&self) -> bool {
        self.allow_cross_dc
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Switch the upstream on or off. Driven by the `enabled` flag of the
    /// config store on every update.
    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::AcqRel) != enabled {
            tracing::info!(upstream = %self.name, enabled, "Upstream toggled");
        }
    }

    pub fn server_count(&self) -> usize {
        self.state.load().servers.len()
    }

    /// Config of `profile`, falling back to the default profile.
    pub fn config(&self, profile: &str) -> Arc<UpstreamConfig> {
        self.state
            .load()
            .config(profile)
            .unwrap_or_else(|| Arc::new(UpstreamConfig::default()))
    }

    /// Replace configs and servers in one step.
    ///
    /// Servers whose descriptor is unchanged are carried over. New servers
    /// joining a non-empty upstream slow-start when the default profile asks
    /// for it.
    pub fn update_config(
        &self,
        configs: HashMap<String, UpstreamConfig>,
        descriptors: &[ServerDescriptor],
    ) -> Result<(), ServerError> {
        let current = self.state.load();

        let mut configs: HashMap<String, Arc<UpstreamConfig>> =
            configs.into_iter().map(|(profile, config)| (profile, Arc::new(config))).collect();
        let default_config = configs
            .entry(DEFAULT_PROFILE.to_string())
            .or_insert_with(|| Arc::new(UpstreamConfig::default()))
            .clone();

        let slow_start = !current.servers.is_empty() && default_config.slow_start_interval_sec > 0;

        let mut reused: HashSet<usize> = HashSet::new();
        let mut servers = Vec::with_capacity(descriptors.len());
        let mut added = 0usize;
        for descriptor in descriptors {
            let existing = current
                .servers
                .iter()
                .enumerate()
                .find(|(i, server)| !reused.contains(i) && server.matches(descriptor));

            let server = match existing {
                Some((i, server)) => {
                    reused.insert(i);
                    Arc::clone(server)
                }
                None => {
                    added += 1;
                    let server = if slow_start {
                        Server::slow_starting(descriptor, self.windows, default_config.slow_start_interval())?
                    } else {
                        Server::new(descriptor, self.windows)?
                    };
                    Arc::new(server)
                }
            };
            servers.push(server);
        }

        let removed = current.servers.len() - reused.len();
        self.state.store(Arc::new(UpstreamState { configs, servers }));

        tracing::info!(
            upstream = %self.name,
            servers = descriptors.len(),
            added,
            removed,
            slow_start,
            "Upstream updated"
        );
        Ok(())
    }

    /// Pick the least loaded server not in `excluded` and count the request on it.
    pub fn acquire_server(&self, excluded: &HashSet<usize>) -> Option<ServerEntry> {
        let state = self.state.load();
        let index = least_loaded::select_server(
            &state.servers,
            excluded,
            self.datacenter.as_deref(),
            self.allow_cross_dc,
            Instant::now(),
        )?;

        let server = &state.servers[index];
        server.acquire();
        self.rescale(&state.servers);

        tracing::debug!(upstream = %self.name, server = %server.address(), index, "Server acquired");
        Some(ServerEntry::new(index, server))
    }

    /// Order eligible servers for an adaptive request. Counters are untouched.
    pub fn acquire_adaptive_servers(&self, retries_count: usize) -> Vec<ServerEntry> {
        let state = self.state.load();

        let (indices, candidates): (Vec<usize>, Vec<Arc<Server>>) = state
            .servers
            .iter()
            .enumerate()
            .filter(|(_, server)| {
                server.is_active()
                    && (self.allow_cross_dc || !is_different_dc(server, self.datacenter.as_deref()))
            })
            .map(|(index, server)| (index, Arc::clone(server)))
            .unzip();

        adaptive::select_servers(&candidates, retries_count)
            .into_iter()
            .map(|position| ServerEntry::new(indices[position], &candidates[position]))
            .collect()
    }

    /// Report the outcome of an attempt on `entry`.
    ///
    /// Entries that no longer match the current server list are ignored.
    pub fn release_server(
        &self,
        profile: &str,
        entry: &ServerEntry,
        is_error: bool,
        response_time_micros: u64,
        adaptive: bool,
    ) {
        let state = self.state.load();
        let Some(server) = state
            .servers
            .get(entry.index)
            .filter(|server| server.address() == entry.address)
        else {
            tracing::debug!(
                upstream = %self.name,
                server = %entry.address,
                index = entry.index,
                "Released server is no longer in the list"
            );
            return;
        };

        if adaptive {
            server.record_outcome(is_error, response_time_micros);
            return;
        }

        let fails = server.release(is_error);
        let Some(config) = state.config(profile) else {
            return;
        };
        if is_error && config.max_fails > 0 && fails >= config.max_fails && server.deactivate() {
            let fail_timeout = config.fail_timeout();
            tracing::warn!(
                upstream = %self.name,
                server = %server.address(),
                fails,
                fail_timeout_ms = fail_timeout.as_millis() as u64,
                "Server deactivated"
            );
            self.scheduler.schedule(fail_timeout, Arc::clone(server));

            // the partition shrank; the remaining servers may all be over their weight
            self.rescale(&state.servers);
        }
    }

    /// Subtract one weight unit from every active server of a DC partition
    /// as long as all of them have accumulated at least that much.
    ///
    /// Counters only grow outside this function, so a subtraction never goes
    /// below zero while the lock is held.
    fn rescale(&self, servers: &[Arc<Server>]) {
        let _guard = self.rescale_lock.lock().expect("rescale mutex poisoned");
        let datacenter = self.datacenter.as_deref();
        for remote in [false, true] {
            let partition = servers
                .iter()
                .filter(|server| server.is_active() && is_different_dc(server, datacenter) == remote);

            loop {
                let mut members = 0usize;
                let saturated = partition.clone().all(|server| {
                    members += 1;
                    server.stats_requests() >= server.weight()
                });
                if members == 0 || !saturated {
                    break;
                }
                partition.clone().for_each(|server| server.rescale_stats_requests());
            }
        }
    }

    /// Diagnostic view of the current state.
    pub fn snapshot(&self) -> UpstreamSnapshot {
        let state = self.state.load();
        UpstreamSnapshot {
            name: self.name.clone(),
            enabled: self.is_enabled(),
            datacenter: self.datacenter.clone(),
            profiles: state
                .configs
                .iter()
                .map(|(profile, config)| (profile.clone(), UpstreamConfig::clone(config)))
                .collect(),
            servers: state.servers.iter().map(|server| ServerSnapshot::of(server)).collect(),
        }
    }
}

/// An upstream bound to the profile a caller asked for.
#[derive(Debug, Clone)]
pub struct ProfiledUpstream {
    upstream: Arc<Upstream>,
    profile: String,
}

impl ProfiledUpstream {
    pub fn new(upstream: Arc<Upstream>, profile: impl Into<String>) -> Self {
        Self {
            upstream,
            profile: profile.into(),
        }
    }

    pub fn upstream(&self) -> &Arc<Upstream> {
        &self.upstream
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn config(&self) -> Arc<UpstreamConfig> {
        self.upstream.config(&self.profile)
    }

    pub fn release_server(&self, entry: &ServerEntry, is_error: bool, response_time_micros: u64, adaptive: bool) {
        self.upstream
            .release_server(&self.profile, entry, is_error, response_time_micros, adaptive);
    }
}

/// Serializable view of an upstream.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamSnapshot {
    pub name: String,
    pub enabled: bool,
    pub datacenter: Option<String>,
    pub profiles: BTreeMap<String, UpstreamConfig>,
    pub servers: Vec<ServerSnapshot>,
}

/// Serializable view of a server.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSnapshot {
    pub address: String,
    pub weight: u32,
    pub rack: Option<String>,
    pub datacenter: Option<String>,
    pub active: bool,
    pub requests: u32,
    pub stats_requests: u32,
    pub fails: u32,
    pub success_count: usize,
    pub too_much_errors: bool,
    pub mean_response_time_micros: Option<u64>,
}

impl ServerSnapshot {
    fn of(server: &Server) -> Self {
        let tracker = server.response_time_tracker();
        Self {
            address: server.address().to_string(),
            weight: server.weight(),
            rack: server.rack().map(str::to_string),
            datacenter: server.datacenter().map(str::to_string),
            active: server.is_active(),
            requests: server.requests(),
            stats_requests: server.stats_requests(),
            fails: server.fails(),
            success_count: server.downtime_detector().success_count(),
            too_much_errors: server.downtime_detector().too_much_errors(),
            mean_response_time_micros: (!tracker.is_warm_up()).then(|| tracker.mean()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingScheduler {
        scheduled: Mutex<Vec<(Duration, String)>>,
    }

    impl ReactivationScheduler for RecordingScheduler {
        fn schedule(&self, delay: Duration, server: Arc<Server>) {
            self.scheduled
                .lock()
                .expect("scheduler mutex poisoned")
                .push((delay, server.address().to_string()));
        }
    }

    fn descriptors(addresses: &[&str]) -> Vec<ServerDescriptor> {
        addresses.iter().map(|a| ServerDescriptor::new(*a, 1)).collect()
    }

    fn upstream_with(config: UpstreamConfig, addresses: &[&str]) -> (Upstream, Arc<RecordingScheduler>) {
        let scheduler = Arc::new(RecordingScheduler::default());
        let upstream = Upstream::new("backend", None, false).with_scheduler(scheduler.clone());
        let configs = HashMap::from([(DEFAULT_PROFILE.to_string(), config)]);
        upstream.update_config(configs, &descriptors(addresses)).unwrap();
        (upstream, scheduler)
    }

    #[test]
    fn test_acquire_spreads_and_rescales() {
        let (upstream, _) = upstream_with(UpstreamConfig::default(), &["10.0.0.1:80", "10.0.0.2:80"]);

        let first = upstream.acquire_server(&HashSet::new()).unwrap();
        let second = upstream.acquire_server(&HashSet::new()).unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);

        // both reached their weight: the cumulative counters were rescaled
        let snapshot = upstream.snapshot();
        assert!(snapshot.servers.iter().all(|s| s.stats_requests == 0));
        assert!(snapshot.servers.iter().all(|s| s.requests == 1));
    }

    #[test]
    fn test_excluded_servers_are_skipped() {
        let (upstream, _) = upstream_with(UpstreamConfig::default(), &["10.0.0.1:80", "10.0.0.2:80"]);
        let excluded = HashSet::from([0, 1]);
        assert!(upstream.acquire_server(&excluded).is_none());
        assert_eq!(upstream.acquire_server(&HashSet::from([0])).unwrap().index, 1);
    }

    #[test]
    fn test_release_after_shrink_is_ignored() {
        let (upstream, _) = upstream_with(UpstreamConfig::default(), &["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]);
        let entry = upstream.acquire_server(&HashSet::from([0, 1])).unwrap();
        assert_eq!(entry.index, 2);

        upstream
            .update_config(HashMap::new(), &descriptors(&["10.0.0.1:80"]))
            .unwrap();
        upstream.release_server(DEFAULT_PROFILE, &entry, true, 0, false);

        let snapshot = upstream.snapshot();
        assert_eq!(snapshot.servers.len(), 1);
        assert_eq!(snapshot.servers[0].fails, 0);
    }

    #[test]
    fn test_release_with_replaced_address_is_ignored() {
        let (upstream, _) = upstream_with(UpstreamConfig::default(), &["10.0.0.1:80"]);
        let entry = upstream.acquire_server(&HashSet::new()).unwrap();

        upstream
            .update_config(HashMap::new(), &descriptors(&["10.0.0.9:80"]))
            .unwrap();
        upstream.release_server(DEFAULT_PROFILE, &entry, true, 0, false);
        assert_eq!(upstream.snapshot().servers[0].fails, 0);
    }

    #[test]
    fn test_deactivation_after_max_fails() {
        let config = UpstreamConfig {
            max_fails: 2,
            fail_timeout_ms: 3_000,
            ..Default::default()
        };
        let (upstream, scheduler) = upstream_with(config, &["10.0.0.1:80", "10.0.0.2:80"]);

        for _ in 0..2 {
            let entry = upstream.acquire_server(&HashSet::from([1])).unwrap();
            upstream.release_server(DEFAULT_PROFILE, &entry, true, 0, false);
        }

        let snapshot = upstream.snapshot();
        assert!(!snapshot.servers[0].active);
        assert!(snapshot.servers[1].active);
        assert_eq!(
            *scheduler.scheduled.lock().unwrap(),
            vec![(Duration::from_secs(3), "10.0.0.1:80".to_string())]
        );

        // inactive server is never selected
        assert_eq!(upstream.acquire_server(&HashSet::new()).unwrap().index, 1);
    }

    #[test]
    fn test_zero_max_fails_never_deactivates() {
        let config = UpstreamConfig {
            max_fails: 0,
            ..Default::default()
        };
        let (upstream, scheduler) = upstream_with(config, &["10.0.0.1:80"]);
        for _ in 0..10 {
            let entry = upstream.acquire_server(&HashSet::new()).unwrap();
            upstream.release_server(DEFAULT_PROFILE, &entry, true, 0, false);
        }
        assert!(upstream.snapshot().servers[0].active);
        assert!(scheduler.scheduled.lock().unwrap().is_empty());
    }

    #[test]
    fn test_success_resets_fails() {
        let config = UpstreamConfig {
            max_fails: 3,
            ..Default::default()
        };
        let (upstream, _) = upstream_with(config, &["10.0.0.1:80"]);
        for is_error in [true, true, false] {
            let entry = upstream.acquire_server(&HashSet::new()).unwrap();
            upstream.release_server(DEFAULT_PROFILE, &entry, is_error, 0, false);
        }
        assert_eq!(upstream.snapshot().servers[0].fails, 0);
    }

    #[test]
    fn test_adaptive_release_updates_trackers_only() {
        let (upstream, _) = upstream_with(UpstreamConfig::default(), &["10.0.0.1:80"]);
        let entries = upstream.acquire_adaptive_servers(2);
        assert_eq!(entries.len(), 2);

        upstream.release_server(DEFAULT_PROFILE, &entries[0], true, 0, true);
        let snapshot = upstream.snapshot();
        assert_eq!(snapshot.servers[0].fails, 0);
        assert_eq!(snapshot.servers[0].requests, 0);
        assert_eq!(snapshot.servers[0].success_count, 99);
    }

    #[test]
    fn test_adaptive_excludes_remote_and_inactive() {
        let upstream = Upstream::new("backend", Some("DC1"), false);
        let servers = vec![
            ServerDescriptor::new("10.0.0.1:80", 1).with_datacenter("dc1"),
            ServerDescriptor::new("10.0.0.2:80", 1).with_datacenter("dc2"),
            ServerDescriptor::new("10.0.0.3:80", 1).with_datacenter("dc1"),
        ];
        upstream.update_config(HashMap::new(), &servers).unwrap();
        upstream.state.load().servers[2].deactivate();

        for _ in 0..20 {
            let entries = upstream.acquire_adaptive_servers(3);
            assert!(entries.iter().all(|entry| entry.index == 0));
        }
    }

    #[test]
    fn test_update_reuses_unchanged_servers() {
        let (upstream, _) = upstream_with(UpstreamConfig::default(), &["10.0.0.1:80", "10.0.0.2:80"]);
        let before = upstream.state.load().servers.clone();

        upstream
            .update_config(HashMap::new(), &descriptors(&["10.0.0.2:80", "10.0.0.3:80"]))
            .unwrap();
        let after = upstream.state.load().servers.clone();

        assert!(Arc::ptr_eq(&before[1], &after[0]));
        assert_eq!(after[1].address(), "10.0.0.3:80");
    }

    #[test]
    fn test_new_servers_slow_start() {
        let config = UpstreamConfig {
            slow_start_interval_sec: 60,
            ..Default::default()
        };
        let (upstream, _) = upstream_with(config.clone(), &["10.0.0.1:80"]);
        let configs = HashMap::from([(DEFAULT_PROFILE.to_string(), config)]);
        upstream
            .update_config(
                configs,
                &[
                    ServerDescriptor::new("10.0.0.1:80", 1),
                    ServerDescriptor::new("10.0.0.2:80", 10),
                ],
            )
            .unwrap();

        let servers = upstream.state.load().servers.clone();
        assert_eq!(servers[0].effective_weight(Instant::now()), 1);
        assert!(servers[1].effective_weight(Instant::now()) < 10);
        assert!(servers[1].downtime_detector().success_count() < servers[0].downtime_detector().success_count());
    }

    #[test]
    fn test_profile_fallback() {
        let upstream = Upstream::new("backend", None, false);
        let configs = HashMap::from([(
            "slow".to_string(),
            UpstreamConfig {
                request_timeout_ms: 9_000,
                ..Default::default()
            },
        )]);
        upstream.update_config(configs, &[]).unwrap();

        assert_eq!(upstream.config("slow").request_timeout_ms, 9_000);
        assert_eq!(upstream.config("missing"), Arc::new(UpstreamConfig::default()));
    }

    #[test]
    fn test_snapshot_serializes() {
        let (upstream, _) = upstream_with(UpstreamConfig::default(), &["10.0.0.1:80"]);
        let json = serde_json::to_value(upstream.snapshot()).unwrap();
        assert_eq!(json["name"], "backend");
        assert_eq!(json["servers"][0]["address"], "10.0.0.1:80");
        assert_eq!(json["profiles"]["default"]["max_tries"], 2);
    }

    fn weighted_upstream() -> (Arc<Upstream>, Vec<ServerDescriptor>) {
        let servers: Vec<ServerDescriptor> = (1..=4)
            .map(|weight| ServerDescriptor::new(format!("10.0.0.{}:80", weight), weight))
            .collect();
        let upstream = Upstream::new("backend", None, false).with_scheduler(Arc::new(RecordingScheduler::default()));
        let config = UpstreamConfig {
            max_fails: 0,
            ..Default::default()
        };
        upstream
            .update_config(HashMap::from([(DEFAULT_PROFILE.to_string(), config)]), &servers)
            .unwrap();
        (Arc::new(upstream), servers)
    }

    #[test]
    fn test_picks_follow_weights() {
        let (upstream, _) = weighted_upstream();
        let mut picks = [0u32; 4];
        for _ in 0..1_000 {
            let entry = upstream.acquire_server(&HashSet::new()).unwrap();
            picks[entry.index] += 1;
            upstream.release_server(DEFAULT_PROFILE, &entry, false, 0, false);
        }

        assert_eq!(picks, [100, 200, 300, 400]);
        let snapshot = upstream.snapshot();
        assert!(snapshot.servers.iter().all(|s| s.stats_requests == 0));
    }

    #[test]
    fn test_concurrent_acquire_release_with_updates() {
        const THREADS: usize = 8;
        const ITERATIONS: usize = 2_000;

        let (upstream, servers) = weighted_upstream();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let workers: Vec<_> = (0..THREADS)
                .map(|_| {
                    let upstream = Arc::clone(&upstream);
                    scope.spawn(move || {
                        for _ in 0..ITERATIONS {
                            let entry = upstream.acquire_server(&HashSet::new()).unwrap();
                            upstream.release_server(DEFAULT_PROFILE, &entry, false, 0, false);
                        }
                    })
                })
                .collect();

            scope.spawn(|| {
                let config = UpstreamConfig {
                    max_fails: 0,
                    ..Default::default()
                };
                while !done.load(Ordering::Acquire) {
                    let configs = HashMap::from([(DEFAULT_PROFILE.to_string(), config.clone())]);
                    upstream.update_config(configs, &servers).unwrap();
                    std::thread::yield_now();
                }
            });

            for worker in workers {
                worker.join().unwrap();
            }
            done.store(true, Ordering::Release);
        });

        let snapshot = upstream.snapshot();
        assert_eq!(snapshot.servers.len(), 4);
        assert!(snapshot.servers.iter().all(|s| s.requests == 0));
        // the last rescale pass left at least one server under its weight
        assert!(snapshot.servers.iter().any(|s| s.stats_requests < s.weight));
        let total = (THREADS * ITERATIONS) as u32;
        assert!(snapshot.servers.iter().all(|s| s.stats_requests <= total));
    }

    #[test]
    fn test_rescale_per_datacenter_partition() {
        let upstream = Upstream::new("backend", Some("dc1"), true);
        let servers = vec![
            ServerDescriptor::new("10.0.0.1:80", 1).with_datacenter("dc1"),
            ServerDescriptor::new("10.0.0.2:80", 1).with_datacenter("dc1"),
            ServerDescriptor::new("10.0.1.1:80", 1).with_datacenter("dc2"),
            ServerDescriptor::new("10.0.1.2:80", 1).with_datacenter("dc2"),
        ];
        upstream.update_config(HashMap::new(), &servers).unwrap();
        let stats = || {
            upstream
                .snapshot()
                .servers
                .iter()
                .map(|s| s.stats_requests)
                .collect::<Vec<_>>()
        };

        // local servers saturate and rescale while remote ones are still idle
        assert_eq!(upstream.acquire_server(&HashSet::new()).unwrap().index, 0);
        assert_eq!(upstream.acquire_server(&HashSet::new()).unwrap().index, 1);
        assert_eq!(stats(), vec![0, 0, 0, 0]);

        assert_eq!(upstream.acquire_server(&HashSet::from([0, 1])).unwrap().index, 2);
        assert_eq!(stats(), vec![0, 0, 1, 0]);

        // a single local pick does not touch the remote partition
        assert_eq!(upstream.acquire_server(&HashSet::from([1])).unwrap().index, 0);
        assert_eq!(stats(), vec![1, 0, 1, 0]);

        assert_eq!(upstream.acquire_server(&HashSet::from([0, 1, 2])).unwrap().index, 3);
        assert_eq!(stats(), vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_deactivation_rescales_remaining_servers() {
        let config = UpstreamConfig {
            max_fails: 1,
            ..Default::default()
        };
        let (upstream, _) = upstream_with(config, &["10.0.0.1:80", "10.0.0.2:80"]);

        let first = upstream.acquire_server(&HashSet::from([1])).unwrap();
        assert_eq!(upstream.snapshot().servers[0].stats_requests, 1);
        let entry = upstream.acquire_server(&HashSet::from([0])).unwrap();
        assert_eq!(entry.index, 1);
        upstream.release_server(DEFAULT_PROFILE, &entry, false, 0, false);
        // both at weight: rescaled on acquire
        assert_eq!(upstream.snapshot().servers[1].stats_requests, 0);

        let second = upstream.acquire_server(&HashSet::from([0])).unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(upstream.snapshot().servers[1].stats_requests, 1);

        // server 0 fails and leaves; server 1 alone is at its weight
        upstream.release_server(DEFAULT_PROFILE, &first, true, 0, false);
        let snapshot = upstream.snapshot();
        assert!(!snapshot.servers[0].active);
        assert_eq!(snapshot.servers[1].stats_requests, 0);
    }

    #[test]
    fn test_set_enabled() {
        let upstream = Upstream::new("backend", None, false);
        assert!(upstream.is_enabled());
        upstream.set_enabled(false);
        assert!(!upstream.is_enabled());
        assert!(!upstream.snapshot().enabled);
    }
}
