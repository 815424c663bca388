use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for outbound transport calls
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// Error when connection to the upstream fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when the upstream does not answer in time
    #[error("Timeout error after {0} seconds")]
    Timeout(u64),

    /// Error when the outbound request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Transport defines the port (interface) for issuing one HTTP request to an upstream.
///
/// Implementations own their connection-pooling policy. Cancellation is cooperative:
/// the dispatcher drops the returned future once a winner is chosen, so an implementation
/// must release its connection when dropped mid-flight.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send an HTTP request to an upstream
    ///
    /// # Arguments
    /// * `req` - The fully built outbound request (absolute URI, forwarding headers set)
    ///
    /// # Returns
    /// A future that resolves to the upstream's response head with a streaming body,
    /// or an error if no response was obtained
    async fn send(&self, req: Request<AxumBody>) -> TransportResult<Response<AxumBody>>;
}
