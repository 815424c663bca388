//! Header rules applied when a request is fanned out and when the chosen response is
//! relayed back.
//!
//! The exclusion set covers headers that are scoped to a single connection or to a
//! particular content coding. They are dropped in both directions.
use std::net::IpAddr;

use hyper::{
    HeaderMap,
    header::{self, HeaderName, HeaderValue},
};

/// Value placed in the loop-prevention header of every forwarded request
pub const LOOP_SENTINEL: &str = "yes";

const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");

/// Whether a header is never relayed in either direction
pub fn is_excluded(name: &HeaderName) -> bool {
    *name == header::ACCEPT_ENCODING
        || *name == header::CONTENT_ENCODING
        || *name == header::CONNECTION
        || *name == PROXY_CONNECTION
}

/// Copy every header except the exclusion set, keeping repeated values in order
pub fn filter_headers(source: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(source.len());
    for (name, value) in source.iter() {
        if !is_excluded(name) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Build the independent header set for one outbound attempt.
///
/// Sets `X-Real-IP`, extends `X-Forwarded-For` with the client address and marks the
/// request with the loop-prevention header. `Host` is carried over untouched.
pub fn forwarded_headers(
    inbound: &HeaderMap,
    client_ip: IpAddr,
    loop_header: &HeaderName,
) -> HeaderMap {
    let mut headers = filter_headers(inbound);
    let ip = client_ip.to_string();

    // An inbound chain split over several header lines collapses into one value
    let chain: Vec<&str> = inbound
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .collect();
    let xff = if chain.is_empty() {
        ip.clone()
    } else {
        format!("{},{}", chain.join(","), ip)
    };

    if let Ok(value) = HeaderValue::from_str(&ip) {
        headers.insert(X_REAL_IP, value);
    }
    if let Ok(value) = HeaderValue::from_str(&xff) {
        headers.insert(X_FORWARDED_FOR, value);
    }
    headers.insert(loop_header.clone(), HeaderValue::from_static(LOOP_SENTINEL));

    headers
}

/// Whether the request is itself a forwarded copy that re-entered a dispatcher
pub fn is_forwarded_copy(headers: &HeaderMap, loop_header: &HeaderName) -> bool {
    headers
        .get(loop_header)
        .is_some_and(|v| v.as_bytes() == LOOP_SENTINEL.as_bytes())
}

/// Ensure the forwarded path begins with `/`
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
