//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use upstream_balancer::config::schema::{BalancerSettings, UpstreamConfig, DEFAULT_PROFILE};
use upstream_balancer::load_balancer::ServerDescriptor;
use upstream_balancer::manager::{BalancingUpstreamManager, ConfigStore, ServerStore};
use upstream_balancer::observability::MonitoringSink;
use upstream_balancer::request::{OutboundRequest, RequestContext, RequestExecutor, ResponseWithTiming, UpstreamResponse};

/// Executor answering from a script of statuses, recording every attempt.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<u16>>,
    calls: Mutex<Vec<String>>,
    timeouts: Mutex<Vec<(Option<Duration>, Option<Duration>)>>,
}

impl ScriptedExecutor {
    pub fn new(statuses: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(statuses.iter().copied().collect()),
            calls: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
        })
    }

    /// URIs of all attempts, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// `(timeout, connect_timeout)` of all attempts, in order.
    pub fn timeouts(&self) -> Vec<(Option<Duration>, Option<Duration>)> {
        self.timeouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestExecutor for ScriptedExecutor {
    async fn execute(&self, request: OutboundRequest, _attempt: u32, _context: &RequestContext) -> ResponseWithTiming {
        self.calls.lock().unwrap().push(request.uri.to_string());
        self.timeouts.lock().unwrap().push((request.timeout, request.connect_timeout));
        let status = self.script.lock().unwrap().pop_front().unwrap_or(200);
        ResponseWithTiming::new(UpstreamResponse::new(status), Duration::from_millis(1))
    }
}

/// Monitoring sink that keeps what it was told.
#[derive(Debug, Default)]
pub struct RecordingMonitoring {
    pub requests: Mutex<Vec<(String, u16, bool)>>,
    pub retries: Mutex<Vec<(u16, u16, u32)>>,
    pub ignored: Mutex<Vec<String>>,
}

impl MonitoringSink for RecordingMonitoring {
    fn count_request(&self, _: &str, _: Option<&str>, server: &str, status: u16, _: u64, is_final: bool) {
        self.requests.lock().unwrap().push((server.to_string(), status, is_final));
    }

    fn count_retry(&self, _: &str, _: Option<&str>, _: &str, status: u16, first_status: u16, retry_count: u32) {
        self.retries.lock().unwrap().push((status, first_status, retry_count));
    }

    fn count_update_ignore(&self, upstream: &str, _: Option<&str>) {
        self.ignored.lock().unwrap().push(upstream.to_string());
    }
}

/// In-memory server and config store.
#[derive(Debug, Default)]
pub struct StaticStore {
    servers: Mutex<HashMap<String, Vec<ServerDescriptor>>>,
    configs: Mutex<HashMap<String, HashMap<String, UpstreamConfig>>>,
}

impl StaticStore {
    pub fn set(&self, upstream: &str, config: UpstreamConfig, servers: Vec<ServerDescriptor>) {
        self.servers.lock().unwrap().insert(upstream.to_string(), servers);
        self.configs
            .lock()
            .unwrap()
            .insert(upstream.to_string(), HashMap::from([(DEFAULT_PROFILE.to_string(), config)]));
    }
}

impl ServerStore for StaticStore {
    fn get_servers(&self, upstream: &str) -> Vec<ServerDescriptor> {
        self.servers.lock().unwrap().get(upstream).cloned().unwrap_or_default()
    }

    fn get_initial_size(&self, _upstream: &str) -> Option<usize> {
        None
    }
}

impl ConfigStore for StaticStore {
    fn get_upstream_config(&self, upstream: &str) -> Option<HashMap<String, UpstreamConfig>> {
        self.configs.lock().unwrap().get(upstream).cloned()
    }
}

/// Manager over a single upstream named `upstream`.
pub fn single_upstream_manager(
    upstream: &str,
    config: UpstreamConfig,
    addresses: &[String],
    settings: BalancerSettings,
    monitoring: Arc<RecordingMonitoring>,
) -> Arc<BalancingUpstreamManager> {
    let store = Arc::new(StaticStore::default());
    let servers = addresses.iter().map(|address| ServerDescriptor::new(address.clone(), 1)).collect();
    store.set(upstream, config, servers);

    let manager = BalancingUpstreamManager::new(settings, store.clone(), store, monitoring);
    manager.update_upstreams(&[upstream]).unwrap();
    Arc::new(manager)
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;

                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    500 => "500 Internal Server Error",
                    502 => "502 Bad Gateway",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
