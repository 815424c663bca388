use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::Response,
};

use crate::{
    adapters::middleware::{access_log_middleware, request_id_middleware},
    core::Dispatcher,
};

/// Inbound HTTP endpoint: routes matching requests into the [`Dispatcher`].
///
/// The route pattern follows the usual mux convention: a pattern ending in `/` matches the
/// whole subtree beneath it, anything else matches only that exact path. A pattern of `/`
/// therefore dispatches every request.
///
/// Matching runs on the canonical path only. A request whose path still carries `.` or
/// `..` segments (literal or percent-encoded) or repeated slashes is redirected to the
/// cleaned path, and the subtree root without its trailing slash is redirected to the
/// pattern itself. Neither is dispatched.
pub struct HttpHandler {
    dispatcher: Dispatcher,
    pattern: String,
}

/// How the endpoint answers a request path
#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    Dispatch,
    /// 301 to this path
    Redirect(String),
    NotFound,
}

impl HttpHandler {
    pub fn new(dispatcher: Dispatcher, pattern: impl Into<String>) -> Self {
        Self {
            dispatcher,
            pattern: pattern.into(),
        }
    }

    /// Whether a canonical request path is handed to the dispatcher
    pub fn matches(&self, path: &str) -> bool {
        if self.pattern.ends_with('/') {
            path.starts_with(&self.pattern)
        } else {
            path == self.pattern
        }
    }

    /// Decide what a raw request path gets: dispatch, a redirect to its canonical form, or 404.
    pub fn route(&self, path: &str) -> Route {
        if has_encoded_separator(path) {
            return Route::NotFound;
        }

        let cleaned = clean_path(path);
        if cleaned != path {
            return Route::Redirect(cleaned);
        }

        if self.pattern.len() > 1 && self.pattern.strip_suffix('/') == Some(path) {
            return Route::Redirect(self.pattern.clone());
        }

        if self.matches(path) {
            Route::Dispatch
        } else {
            Route::NotFound
        }
    }

    /// Dispatch a routed request, redirect a non-canonical path, or answer 404 for paths
    /// outside the pattern.
    pub async fn handle_request(
        &self,
        req: Request,
        client_addr: Option<SocketAddr>,
    ) -> Response {
        match self.route(req.uri().path()) {
            Route::Dispatch => self.dispatcher.dispatch(req, client_addr).await,
            Route::Redirect(path) => {
                let location = match req.uri().query() {
                    Some(query) => format!("{path}?{query}"),
                    None => path,
                };
                tracing::debug!("Redirecting {} to {}", req.uri().path(), location);
                match HeaderValue::from_str(&location) {
                    Ok(value) => {
                        let mut resp =
                            text_response(StatusCode::MOVED_PERMANENTLY, "Moved Permanently\n");
                        resp.headers_mut().insert(header::LOCATION, value);
                        resp
                    }
                    Err(_) => text_response(StatusCode::NOT_FOUND, "Not Found\n"),
                }
            }
            Route::NotFound => {
                tracing::debug!("No route for {}", req.uri().path());
                text_response(StatusCode::NOT_FOUND, "Not Found\n")
            }
        }
    }

    /// Build the axum router serving every path through this handler, with access logging
    /// and request ids layered on.
    ///
    /// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so the client
    /// address reaches the dispatcher.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .fallback(handle)
            .with_state(self)
            .layer(middleware::from_fn(access_log_middleware))
            .layer(middleware::from_fn(request_id_middleware))
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response {
    let mut resp = Response::new(AxumBody::from(body));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}

/// Resolve `.` and `..` segments and collapse repeated slashes, the way a mux cleans a path
/// before matching. Segments are compared in percent-decoded form, so `%2e%2e` counts as
/// `..`. Other segments are kept exactly as sent. A trailing slash survives.
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        let decoded = urlencoding::decode_binary(segment.as_bytes());
        match decoded.as_ref() {
            b"" | b"." => {}
            b".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let mut cleaned = String::with_capacity(path.len() + 1);
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if cleaned.is_empty() || path.ends_with('/') {
        cleaned.push('/');
    }
    cleaned
}

/// A percent-encoded `/` inside a segment, which origins may decode into a separator
fn has_encoded_separator(path: &str) -> bool {
    path.split('/')
        .any(|segment| urlencoding::decode_binary(segment.as_bytes()).contains(&b'/'))
}

async fn handle(State(handler): State<Arc<HttpHandler>>, req: Request) -> Response {
    let client_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    handler.handle_request(req, client_addr).await
}
