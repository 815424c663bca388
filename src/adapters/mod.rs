pub mod http_client;
pub mod http_handler;
pub mod middleware;

/// Re-export commonly used types from adapters
pub use http_client::HyperTransport;
pub use http_handler::HttpHandler;
pub use middleware::*;
