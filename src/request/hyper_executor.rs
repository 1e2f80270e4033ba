//! Executor backed by the hyper-util pooled client.
//!
//! The connect timeout lives on the connector, so one pooled client is kept
//! per distinct connect timeout requested by the profiles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::request::executor::{RequestContext, RequestExecutor};
use crate::request::types::{status, OutboundRequest, ResponseWithTiming, UpstreamResponse};

/// Fallback attempt timeout when the request carries none.
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
enum AttemptError {
    Client(hyper_util::client::legacy::Error),
    Body(hyper::Error),
}

type PooledClient = Client<HttpConnector, Full<Bytes>>;

fn build_client(connect_timeout: Duration) -> PooledClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// HTTP/1.1 executor over plain TCP.
#[derive(Debug, Clone)]
pub struct HyperExecutor {
    /// Connect timeout for requests that carry none.
    default_connect_timeout: Duration,
    clients: Arc<DashMap<Duration, PooledClient>>,
}

impl HyperExecutor {
    pub fn new(default_connect_timeout: Duration) -> Self {
        let clients = DashMap::new();
        clients.insert(default_connect_timeout, build_client(default_connect_timeout));
        Self {
            default_connect_timeout,
            clients: Arc::new(clients),
        }
    }

    /// Pooled client whose connector uses `connect_timeout`.
    fn client(&self, connect_timeout: Option<Duration>) -> PooledClient {
        let connect_timeout = connect_timeout.unwrap_or(self.default_connect_timeout);
        self.clients
            .entry(connect_timeout)
            .or_insert_with(|| {
                tracing::debug!(connect_timeout_ms = connect_timeout.as_millis() as u64, "Creating pooled client");
                build_client(connect_timeout)
            })
            .clone()
    }

    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, AttemptError> {
        let client = self.client(request.connect_timeout);
        let mut outgoing = Request::new(Full::new(request.body));
        *outgoing.method_mut() = request.method;
        *outgoing.uri_mut() = request.uri;
        *outgoing.headers_mut() = request.headers;

        let response = client.request(outgoing).await.map_err(AttemptError::Client)?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await.map_err(AttemptError::Body)?.to_bytes();

        Ok(UpstreamResponse {
            status: parts.status.as_u16(),
            reason: parts.status.canonical_reason().map(str::to_string),
            headers: parts.headers,
            body,
        })
    }
}

impl Default for HyperExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait]
impl RequestExecutor for HyperExecutor {
    async fn execute(&self, request: OutboundRequest, attempt: u32, context: &RequestContext) -> ResponseWithTiming {
        let start = Instant::now();
        let timeout = request.timeout.unwrap_or(DEFAULT_ATTEMPT_TIMEOUT);
        let uri = request.uri.clone();

        let response = match tokio::time::timeout(timeout, self.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(AttemptError::Client(e))) if e.is_connect() => {
                tracing::debug!(request_id = %context.request_id, uri = %uri, attempt, error = %e, "Connect failed");
                UpstreamResponse::connect_error()
            }
            Ok(Err(AttemptError::Client(e))) => {
                tracing::debug!(request_id = %context.request_id, uri = %uri, attempt, error = %e, "Request failed");
                UpstreamResponse::synthetic(status::CONNECT_TIMEOUT_ERROR, &e.to_string())
            }
            Ok(Err(AttemptError::Body(e))) => {
                tracing::debug!(request_id = %context.request_id, uri = %uri, attempt, error = %e, "Response body failed");
                UpstreamResponse::synthetic(status::CONNECT_TIMEOUT_ERROR, &e.to_string())
            }
            Err(_) => {
                tracing::debug!(
                    request_id = %context.request_id,
                    uri = %uri,
                    attempt,
                    timeout_ms = timeout.as_millis() as u64,
                    "Request timed out"
                );
                UpstreamResponse::request_timeout()
            }
        };

        ResponseWithTiming::new(response, start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_one_client_per_connect_timeout() {
        let executor = HyperExecutor::new(Duration::from_millis(200));
        executor.client(None);
        executor.client(Some(Duration::from_millis(200)));
        assert_eq!(executor.clients.len(), 1);

        executor.client(Some(Duration::from_millis(50)));
        executor.client(Some(Duration::from_millis(50)));
        assert_eq!(executor.clients.len(), 2);
    }
}
