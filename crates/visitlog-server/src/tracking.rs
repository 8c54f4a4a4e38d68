//! Ingestion middleware: hands every completed request to the pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use visitlog_core::event::RequestInfo;
use visitlog_core::pipeline::Pipeline;

/// Client IP for fingerprinting: the first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the socket address without its port. Empty when none
/// is available.
pub fn extract_client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    remote.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Runs the inner service, then records the request.
///
/// The response is returned untouched. Tracking only takes in-memory locks,
/// so it never waits on the store.
pub async fn track_requests(
    State(pipeline): State<Arc<Pipeline>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let headers = request.headers();
    let mut info = RequestInfo {
        path: request.uri().path().to_string(),
        method: request.method().to_string(),
        client_ip: extract_client_ip(headers, remote),
        user_agent: header_str(headers, header::USER_AGENT),
        referrer: header_str(headers, header::REFERER),
        query: request.uri().query().unwrap_or("").to_string(),
        duration_ms: 0,
    };

    let response = next.run(request).await;

    info.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    pipeline.track(info).await;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn remote() -> Option<SocketAddr> {
        Some(SocketAddr::from(([192, 0, 2, 10], 51234)))
    }

    #[test]
    fn forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.5 , 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(extract_client_ip(&headers, remote()), "203.0.113.5");
    }

    #[test]
    fn real_ip_when_no_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(extract_client_ip(&headers, remote()), "198.51.100.2");
    }

    #[test]
    fn socket_address_without_port() {
        assert_eq!(extract_client_ip(&HeaderMap::new(), remote()), "192.0.2.10");

        let v6 = SocketAddr::from(([0x2001, 0xdb8, 0, 0, 0, 0, 0, 1], 443));
        assert_eq!(extract_client_ip(&HeaderMap::new(), Some(v6)), "2001:db8::1");
    }

    #[test]
    fn nothing_available_is_empty() {
        assert_eq!(extract_client_ip(&HeaderMap::new(), None), "");
    }
}
