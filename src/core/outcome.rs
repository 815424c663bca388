use axum::body::Body as AxumBody;
use hyper::{
    Method, Response, StatusCode,
    header::{self, HeaderValue},
};
use thiserror::Error;

use crate::core::forwarding::filter_headers;

/// `Allow` value sent when the dispatcher is restricted to idempotent methods
pub const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS, TRACE, PUT, DELETE";

/// Result of racing every upstream attempt for one inbound request
#[derive(Debug)]
pub enum DispatchOutcome {
    /// First response satisfying the success predicate
    Winner(Response<AxumBody>),
    /// No attempt succeeded; the first failing response to complete
    FallbackError(Response<AxumBody>),
    /// No attempt produced a response at all
    GatewayFailure,
}

impl DispatchOutcome {
    /// Short label used for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Winner(_) => "winner",
            Self::FallbackError(_) => "fallback_error",
            Self::GatewayFailure => "gateway_failure",
        }
    }

    /// Status the caller will see
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Winner(resp) | Self::FallbackError(resp) => resp.status(),
            Self::GatewayFailure => StatusCode::BAD_GATEWAY,
        }
    }

    /// Relay the chosen response: upstream status, headers minus the exclusion set, and
    /// the body streamed through untouched. A gateway failure is an empty 502.
    pub fn into_response(self) -> Response<AxumBody> {
        match self {
            Self::Winner(resp) | Self::FallbackError(resp) => {
                let (parts, body) = resp.into_parts();
                let mut relayed = Response::new(body);
                *relayed.status_mut() = parts.status;
                *relayed.headers_mut() = filter_headers(&parts.headers);
                relayed
            }
            Self::GatewayFailure => {
                let mut resp = Response::new(AxumBody::empty());
                *resp.status_mut() = StatusCode::BAD_GATEWAY;
                resp
            }
        }
    }
}

/// Reasons a request is answered directly without contacting any upstream
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Rejection {
    #[error("method {0} is not allowed")]
    MethodNotAllowed(Method),

    #[error("request carries the loop-prevention marker")]
    LoopDetected,

    #[error("request body reached the {0} byte limit")]
    PayloadTooLarge(usize),

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("client address is unavailable")]
    ClientAddress,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::LoopDetected => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BodyRead(_) => StatusCode::BAD_REQUEST,
            Self::ClientAddress => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Plain-text response carrying the canonical reason phrase. Internal details stay in
    /// the logs.
    pub fn into_response(self) -> Response<AxumBody> {
        let status = self.status();
        let reason = status.canonical_reason().unwrap_or("Error");
        let mut resp = Response::new(AxumBody::from(format!("{reason}\n")));
        *resp.status_mut() = status;
        resp.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        if matches!(self, Self::MethodNotAllowed(_)) {
            resp.headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_header_lists_idempotent_methods() {
        for name in ALLOWED_METHODS.split(", ") {
            let method = Method::from_bytes(name.as_bytes()).unwrap();
            assert!(method.is_idempotent());
        }
        assert!(!Method::POST.is_idempotent());
        assert!(!Method::PATCH.is_idempotent());
    }

    #[test]
    fn test_rejection_status_codes() {
        assert_eq!(
            Rejection::MethodNotAllowed(Method::POST).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(Rejection::LoopDetected.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Rejection::PayloadTooLarge(32 << 20).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            Rejection::BodyRead("reset".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Rejection::ClientAddress.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_method_not_allowed_carries_allow() {
        let resp = Rejection::MethodNotAllowed(Method::POST).into_response();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            resp.headers().get(header::ALLOW).unwrap(),
            "GET, HEAD, OPTIONS, TRACE, PUT, DELETE"
        );
    }

    #[test]
    fn test_gateway_failure_is_empty_502() {
        let outcome = DispatchOutcome::GatewayFailure;
        assert_eq!(outcome.label(), "gateway_failure");
        let resp = outcome.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert!(resp.headers().is_empty());
    }

    #[test]
    fn test_relay_filters_excluded_headers() {
        let upstream = Response::builder()
            .status(StatusCode::FORBIDDEN)
            .header(header::CONTENT_ENCODING, "gzip")
            .header(header::CONNECTION, "close")
            .header("x-origin", "b")
            .body(AxumBody::empty())
            .unwrap();

        let resp = DispatchOutcome::FallbackError(upstream).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());
        assert!(resp.headers().get(header::CONNECTION).is_none());
        assert_eq!(resp.headers().get("x-origin").unwrap(), "b");
    }
}
