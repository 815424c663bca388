use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tokio::time::timeout;

use crate::ports::transport::{Transport, TransportError, TransportResult};

/// Transport adapter using Hyper with Rustls.
///
/// Responsibilities:
/// * One pooled client shared by every attempt of every dispatch
/// * Forces request version to HTTP/1.1 while allowing ALPN to negotiate h2
/// * Bounds the wait for response headers; the body is streamed without a deadline
/// * Leaves `Host` exactly as the dispatcher set it
///
/// Dropping an in-flight [`Transport::send`] future abandons the connection, which is how
/// cancelled attempts release their sockets.
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
    timeout: Duration,
}

impl HyperTransport {
    /// Create a new transport with the given per-attempt timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs
        http_connector.set_connect_timeout(Some(timeout));

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        tracing::info!("Created upstream transport (timeout {:?})", timeout);
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, req: Request<AxumBody>) -> TransportResult<Response<AxumBody>> {
        if req.uri().host().is_none() {
            tracing::error!("Outgoing URI has no host: {}", req.uri());
            return Err(TransportError::InvalidRequest(
                "Outgoing URI has no host".to_string(),
            ));
        }

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;

        tracing::debug!("Sending request: {} {}", parts.method, parts.uri);
        tracing::trace!("Outgoing request headers: {:?}", parts.headers);

        let method = parts.method.clone();
        let uri = parts.uri.clone();
        let outgoing_request = Request::from_parts(parts, body);

        match timeout(self.timeout, self.client.request(outgoing_request)).await {
            Ok(Ok(response)) => {
                let (mut parts, hyper_body) = response.into_parts();

                // The body is re-framed by the inbound server
                parts.headers.remove(header::TRANSFER_ENCODING);

                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Ok(Err(e)) => Err(TransportError::ConnectionError(format!(
                "Request to {method} {uri} failed: {e}"
            ))),
            Err(_) => Err(TransportError::Timeout(self.timeout.as_secs())),
        }
    }
}
