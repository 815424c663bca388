//! Concurrent fan-out of one inbound request to every configured upstream.
//!
//! A dispatch runs in two halves:
//! * [`Dispatcher::admit`] decides whether the request is dispatched at all and buffers its
//!   body once so it can be replayed to every upstream.
//! * [`Dispatcher::race`] spawns one attempt per upstream, takes the first response that
//!   satisfies [`is_success`], cancels the rest and waits for every attempt to wind down
//!   before returning.
//!
//! Only one response ever leaves a dispatch. Every other response is dropped, which closes
//! its body and releases the upstream connection.
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::body::Body as AxumBody;
use bytes::Bytes;
use eyre::{Result, WrapErr};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{
    HeaderMap, Method, Request, Response, StatusCode, Uri,
    header::{self, HeaderName, HeaderValue},
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    config::DispatcherConfig,
    core::{
        forwarding::{forwarded_headers, is_forwarded_copy, normalize_path},
        outcome::{DispatchOutcome, Rejection},
    },
    metrics,
    ports::transport::{Transport, TransportError, TransportResult},
};

/// Inbound bodies are buffered up to, but not including, this many bytes
pub const MAX_BODY_BYTES: usize = 32 << 20;

/// Whether an upstream response is an authoritative answer.
///
/// Client-range statuses count: the upstream explicitly answered. 404 and every server
/// error mean "this upstream doesn't have it", so the race keeps waiting.
pub fn is_success(status: StatusCode) -> bool {
    status.as_u16() < 500 && status != StatusCode::NOT_FOUND
}

/// An admitted request, immutable for the rest of the dispatch.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Normalized path plus the original query, if any
    pub path_and_query: String,
    pub headers: HeaderMap,
    /// Buffered once, shared by every attempt
    pub body: Bytes,
    pub client_ip: IpAddr,
}

type Attempts = JoinSet<Option<Response<AxumBody>>>;

/// Fans requests out to every upstream and relays one answer back.
///
/// Cheap to clone; the transport and upstream list are shared.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    upstreams: Arc<[String]>,
    loop_header: HeaderName,
    idempotent_only: bool,
    drain_timeout: Duration,
}

impl Dispatcher {
    /// Build a dispatcher over the configured upstreams.
    pub fn new(transport: Arc<dyn Transport>, config: &DispatcherConfig) -> Result<Self> {
        let loop_header = HeaderName::from_bytes(config.circular_prevention.as_bytes())
            .wrap_err_with(|| {
                format!(
                    "Invalid loop-prevention header name '{}'",
                    config.circular_prevention
                )
            })?;

        Ok(Self {
            transport,
            upstreams: config.upstreams().into(),
            loop_header,
            idempotent_only: config.idempotent_only,
            drain_timeout: config.drain_timeout(),
        })
    }

    pub fn upstream_count(&self) -> usize {
        self.upstreams.len()
    }

    /// Handle one inbound request end to end. Never fails: every problem maps to a status.
    pub async fn dispatch(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        let span = tracing::info_span!(
            "dispatch",
            http.method = %req.method(),
            http.path = %req.uri().path(),
            upstreams = self.upstreams.len(),
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            match self.admit(req, client_addr).await {
                Ok(inbound) => {
                    let outcome = self.race(inbound).await;
                    let elapsed = start.elapsed();
                    tracing::Span::current().record("outcome", outcome.label());
                    match &outcome {
                        DispatchOutcome::GatewayFailure => {
                            tracing::warn!("No upstream produced a response after {:?}", elapsed)
                        }
                        _ => tracing::info!(
                            "Relaying {} response ({}) after {:?}",
                            outcome.label(),
                            outcome.status(),
                            elapsed
                        ),
                    }
                    metrics::record_dispatch(outcome.label(), elapsed);
                    outcome.into_response()
                }
                Err(rejection) => {
                    tracing::Span::current().record("outcome", "rejected");
                    match rejection {
                        Rejection::ClientAddress | Rejection::BodyRead(_) => {
                            tracing::error!("Rejecting request: {}", rejection)
                        }
                        _ => tracing::info!("Rejecting request: {}", rejection),
                    }
                    metrics::record_dispatch("rejected", start.elapsed());
                    rejection.into_response()
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Decide whether a request is dispatched, buffering its body for replay.
    ///
    /// Checks run in order: method restriction, loop marker, body capture, client address.
    /// Nothing here contacts an upstream.
    pub async fn admit(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Result<InboundRequest, Rejection> {
        let (parts, body) = req.into_parts();

        if self.idempotent_only && !parts.method.is_idempotent() {
            return Err(Rejection::MethodNotAllowed(parts.method));
        }

        if is_forwarded_copy(&parts.headers, &self.loop_header) {
            return Err(Rejection::LoopDetected);
        }

        let body = read_body(&parts.headers, body).await?;

        let mut path_and_query = normalize_path(parts.uri.path());
        if let Some(query) = parts.uri.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        let client_ip = client_addr
            .map(|addr| addr.ip().to_canonical())
            .ok_or(Rejection::ClientAddress)?;

        let mut headers = parts.headers;
        // HTTP/2 callers carry the host in the authority only
        if !headers.contains_key(header::HOST) {
            if let Some(value) = parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
            {
                headers.insert(header::HOST, value);
            }
        }

        Ok(InboundRequest {
            method: parts.method,
            path_and_query,
            headers,
            body,
            client_ip,
        })
    }

    /// Race one attempt per upstream and pick the outcome.
    ///
    /// Completion order decides: the first successful response wins and cancels the rest;
    /// failing that, the first failing response is kept as a fallback. All spawned attempts
    /// are accounted for before this returns.
    pub async fn race(&self, inbound: InboundRequest) -> DispatchOutcome {
        let cancel = CancellationToken::new();
        let mut attempts: Attempts = JoinSet::new();

        for upstream in self.upstreams.iter() {
            let req = match build_attempt_request(&inbound, upstream, &self.loop_header) {
                Ok(req) => req,
                Err(e) => {
                    tracing::warn!("Skipping upstream {}: {}", upstream, e);
                    metrics::record_attempt("transport_error");
                    continue;
                }
            };
            let span = tracing::info_span!("attempt", upstream = %upstream);
            attempts.spawn(
                run_attempt(self.transport.clone(), req, cancel.clone()).instrument(span),
            );
        }

        let mut winner = None;
        let mut fallback = None;
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(Some(resp)) if is_success(resp.status()) => {
                    cancel.cancel();
                    winner = Some(resp);
                    break;
                }
                Ok(Some(resp)) => {
                    if fallback.is_none() {
                        fallback = Some(resp);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::error!("Attempt task failed: {}", e),
            }
        }

        cancel.cancel();
        self.drain(&mut attempts).await;

        match (winner, fallback) {
            (Some(resp), _) => DispatchOutcome::Winner(resp),
            (None, Some(resp)) => DispatchOutcome::FallbackError(resp),
            (None, None) => DispatchOutcome::GatewayFailure,
        }
    }

    /// Wait for cancelled attempts to finish, dropping whatever they still return.
    /// Attempts that ignore cancellation past the drain bound are aborted.
    async fn drain(&self, attempts: &mut Attempts) {
        if attempts.is_empty() {
            return;
        }

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(joined) = attempts.join_next().await {
                if let Ok(Some(resp)) = joined {
                    tracing::debug!("Discarding late {} response", resp.status());
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                "{} attempts still running after {:?}, aborting",
                attempts.len(),
                self.drain_timeout
            );
            attempts.abort_all();
            while attempts.join_next().await.is_some() {}
        }
    }
}

/// Buffer the inbound body once. Reaching [`MAX_BODY_BYTES`] is a 413, any other read
/// failure a 400.
async fn read_body(headers: &HeaderMap, body: AxumBody) -> Result<Bytes, Rejection> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len >= MAX_BODY_BYTES as u64) {
        return Err(Rejection::PayloadTooLarge(MAX_BODY_BYTES));
    }

    match Limited::new(body, MAX_BODY_BYTES - 1).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(Rejection::PayloadTooLarge(MAX_BODY_BYTES)),
        Err(e) => Err(Rejection::BodyRead(e.to_string())),
    }
}

/// Derive the outbound request for one upstream. Each attempt gets its own header map and
/// its own reader over the shared body buffer.
///
/// The target is `{upstream}{path}` followed by the inbound query string, if any. The query
/// is not dropped.
fn build_attempt_request(
    inbound: &InboundRequest,
    upstream: &str,
    loop_header: &HeaderName,
) -> TransportResult<Request<AxumBody>> {
    let target = format!("{upstream}{}", inbound.path_and_query);
    let uri: Uri = target
        .parse()
        .map_err(|e| TransportError::InvalidRequest(format!("{target}: {e}")))?;

    let mut req = Request::new(AxumBody::from(inbound.body.clone()));
    *req.method_mut() = inbound.method.clone();
    *req.uri_mut() = uri;
    *req.headers_mut() = forwarded_headers(&inbound.headers, inbound.client_ip, loop_header);
    Ok(req)
}

/// One attempt: the transport call raced against the shared cancellation signal.
/// Losing the race drops the in-flight call, which tears down its connection.
async fn run_attempt(
    transport: Arc<dyn Transport>,
    req: Request<AxumBody>,
    cancel: CancellationToken,
) -> Option<Response<AxumBody>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("Attempt cancelled");
            metrics::record_attempt("cancelled");
            None
        }
        result = transport.send(req) => match result {
            Ok(resp) => {
                let status = resp.status();
                if is_success(status) {
                    tracing::debug!("Upstream answered {}", status);
                    metrics::record_attempt("success");
                } else {
                    tracing::info!("Upstream answered {}, not authoritative", status);
                    metrics::record_attempt("failure_status");
                }
                Some(resp)
            }
            Err(e) => {
                tracing::warn!("Upstream attempt failed: {}", e);
                metrics::record_attempt("transport_error");
                None
            }
        }
    }
}
