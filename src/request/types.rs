//! Request and response values exchanged with the executor.

use std::time::Duration;

use bytes::Bytes;
use hyper::http::uri::{Authority, Parts, PathAndQuery, Scheme};
use hyper::{HeaderMap, Method, Uri};

/// Status codes produced by the balancing layer itself.
pub mod status {
    pub const BAD_GATEWAY: u16 = 502;
    pub const SERVICE_UNAVAILABLE: u16 = 503;
    pub const GATEWAY_TIMEOUT: u16 = 504;
    /// Transport-level failure reported by the executor.
    pub const CONNECT_TIMEOUT_ERROR: u16 = 599;
}

/// Reason attached to a 599 when the connection could not be established.
pub const CONNECT_ERROR_MESSAGE: &str = "connect error";
/// Reason attached to a 599 when the attempt ran out of time.
pub const REQUEST_TIMEOUT_MESSAGE: &str = "request timeout";
pub const NO_AVAILABLE_SERVERS_MESSAGE: &str = "no available servers";
pub const NO_UPSTREAM_MESSAGE: &str = "no upstream configured";

/// Request handed to the balancer, and after rewriting, to the executor.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Per-attempt timeout. Set by the balancer before each attempt.
    pub timeout: Option<Duration>,
    /// Bound on establishing a new connection. Set from the profile before each attempt.
    pub connect_timeout: Option<Duration>,
}

impl OutboundRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            timeout: None,
            connect_timeout: None,
        }
    }

    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: Uri, body: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, uri).with_body(body)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    /// Host part of the target, used to resolve the upstream.
    pub fn host(&self) -> Option<&str> {
        self.uri.host()
    }

    /// Copy of this request aimed at another server.
    ///
    /// Only scheme and authority change; path and query are preserved.
    pub fn retarget(&self, scheme: &Scheme, authority: &Authority) -> Self {
        let mut parts: Parts = self.uri.clone().into_parts();
        parts.scheme = Some(scheme.clone());
        parts.authority = Some(authority.clone());
        if parts.path_and_query.is_none() {
            parts.path_and_query = Some(PathAndQuery::from_static("/"));
        }

        let mut request = self.clone();
        request.uri = Uri::from_parts(parts).unwrap_or_else(|_| self.uri.clone());
        request
    }
}

/// Response returned by the executor or synthesized by the balancer.
#[derive(Debug, Clone, Default)]
pub struct UpstreamResponse {
    pub status: u16,
    /// Status text; carries the transport error description for 599 responses.
    pub reason: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn synthetic(status: u16, reason: &str) -> Self {
        Self {
            status,
            reason: Some(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn connect_error() -> Self {
        Self::synthetic(status::CONNECT_TIMEOUT_ERROR, CONNECT_ERROR_MESSAGE)
    }

    pub fn request_timeout() -> Self {
        Self::synthetic(status::CONNECT_TIMEOUT_ERROR, REQUEST_TIMEOUT_MESSAGE)
    }

    pub fn no_available_servers() -> Self {
        Self::synthetic(status::BAD_GATEWAY, NO_AVAILABLE_SERVERS_MESSAGE)
    }

    pub fn no_upstream() -> Self {
        Self::synthetic(status::BAD_GATEWAY, NO_UPSTREAM_MESSAGE)
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Transport failure before the connection was established.
    pub fn is_connect_error(&self) -> bool {
        self.status == status::CONNECT_TIMEOUT_ERROR && self.reason() == Some(CONNECT_ERROR_MESSAGE)
    }
}

/// Executor result: the final response plus the time the attempt took.
#[derive(Debug, Clone)]
pub struct ResponseWithTiming {
    pub response: UpstreamResponse,
    pub elapsed: Duration,
}

impl ResponseWithTiming {
    pub fn new(response: UpstreamResponse, elapsed: Duration) -> Self {
        Self { response, elapsed }
    }

    pub fn elapsed_micros(&self) -> u64 {
        u64::try_from(self.elapsed.as_micros()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retarget_preserves_path_and_query() {
        let request = OutboundRequest::get("http://backend/api/v1/items?limit=5".parse().unwrap());
        let authority = Authority::from_static("10.0.0.1:8080");
        let retargeted = request.retarget(&Scheme::HTTP, &authority);
        assert_eq!(retargeted.uri.to_string(), "http://10.0.0.1:8080/api/v1/items?limit=5");
        assert_eq!(request.host(), Some("backend"));
    }

    #[test]
    fn test_retarget_replaces_scheme() {
        let request = OutboundRequest::get("http://backend".parse().unwrap());
        let authority = Authority::from_static("secure.local:8443");
        let retargeted = request.retarget(&Scheme::HTTPS, &authority);
        assert_eq!(retargeted.uri.to_string(), "https://secure.local:8443/");
    }

    #[test]
    fn test_connect_error_detection() {
        assert!(UpstreamResponse::connect_error().is_connect_error());
        assert!(!UpstreamResponse::request_timeout().is_connect_error());
        assert!(!UpstreamResponse::new(503).is_connect_error());
    }
}
