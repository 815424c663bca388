//! Scripted transport shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use acme_dispatcher::{
    config::DispatcherConfig,
    core::Dispatcher,
    ports::transport::{Transport, TransportError, TransportResult},
};
use async_trait::async_trait;
use axum::body::Body as AxumBody;
use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::BodyExt;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};

/// What one upstream does when called
#[derive(Clone)]
pub enum Behavior {
    Respond {
        status: StatusCode,
        delay: Duration,
        body: &'static str,
        headers: Vec<(&'static str, &'static str)>,
    },
    Fail,
    Hang,
}

pub fn respond(status: u16, delay_ms: u64, body: &'static str) -> Behavior {
    Behavior::Respond {
        status: StatusCode::from_u16(status).unwrap(),
        delay: Duration::from_millis(delay_ms),
        body,
        headers: Vec::new(),
    }
}

/// A request as the fake upstream saw it
#[derive(Debug, Clone)]
pub struct Received {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Default)]
pub struct Counters {
    pub calls: Arc<AtomicUsize>,
    pub bodies_opened: Arc<AtomicUsize>,
    pub bodies_closed: Arc<AtomicUsize>,
    pub cancelled: Arc<AtomicUsize>,
}

/// Bumps its counter when dropped while still armed
struct DropCounter {
    counter: Arc<AtomicUsize>,
    armed: bool,
}

impl DropCounter {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        Self {
            counter: counter.clone(),
            armed: true,
        }
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Fake transport keyed by upstream authority (`host:port`)
pub struct FakeTransport {
    behaviors: HashMap<String, Behavior>,
    pub counters: Counters,
    pub received: Mutex<Vec<Received>>,
}

impl FakeTransport {
    pub fn new(behaviors: Vec<(&str, Behavior)>) -> Arc<Self> {
        Arc::new(Self {
            behaviors: behaviors
                .into_iter()
                .map(|(authority, behavior)| (authority.to_string(), behavior))
                .collect(),
            counters: Counters::default(),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.counters.bodies_opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.bodies_closed.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.counters.cancelled.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    /// Response body whose drop is counted as a close
    fn tracked_body(&self, payload: &'static str) -> AxumBody {
        self.counters.bodies_opened.fetch_add(1, Ordering::SeqCst);
        let guard = DropCounter::new(&self.counters.bodies_closed);
        let stream = futures_util::stream::iter(vec![Ok::<_, std::io::Error>(
            Bytes::from_static(payload.as_bytes()),
        )])
        .map(move |chunk| {
            let _keep_alive = &guard;
            chunk
        });
        AxumBody::from_stream(stream)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, req: Request<AxumBody>) -> TransportResult<Response<AxumBody>> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let authority = req
            .uri()
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();

        let (parts, body) = req.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?
            .to_bytes();
        self.received.lock().unwrap().push(Received {
            method: parts.method,
            uri: parts.uri.to_string(),
            headers: parts.headers,
            body,
        });

        // Counts the attempt as cancelled if it is dropped before finishing
        let mut pending = DropCounter::new(&self.counters.cancelled);

        let result = match self.behaviors.get(&authority).cloned() {
            Some(Behavior::Respond {
                status,
                delay,
                body,
                headers,
            }) => {
                tokio::time::sleep(delay).await;
                let mut resp = Response::new(self.tracked_body(body));
                *resp.status_mut() = status;
                for (name, value) in headers {
                    resp.headers_mut().append(name, value.parse().unwrap());
                }
                Ok(resp)
            }
            Some(Behavior::Hang) => std::future::pending().await,
            Some(Behavior::Fail) | None => Err(TransportError::ConnectionError(format!(
                "connection refused: {authority}"
            ))),
        };

        pending.armed = false;
        result
    }
}

pub fn config(upstreams: &[&str]) -> DispatcherConfig {
    DispatcherConfig {
        forward: upstreams.iter().map(|u| format!("http://{u}")).collect(),
        ..DispatcherConfig::default()
    }
}

pub fn dispatcher(transport: Arc<FakeTransport>, config: &DispatcherConfig) -> Dispatcher {
    Dispatcher::new(transport, config).unwrap()
}

pub fn client_addr() -> Option<SocketAddr> {
    Some("192.0.2.10:51000".parse().unwrap())
}

pub fn challenge_request() -> Request<AxumBody> {
    Request::builder()
        .uri("/.well-known/acme-challenge/token123")
        .header("host", "example.com")
        .body(AxumBody::empty())
        .unwrap()
}

pub async fn body_string(resp: Response<AxumBody>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
