//! ACME dispatcher - answer HTTP-01 challenges for a multihomed deployment.
//!
//! Several origins share one hostname, and the certificate authority may reach any of them.
//! The dispatcher sits in front, forwards a copy of each challenge request to every origin
//! concurrently and relays the first answer that looks authoritative. Point the route
//! pattern at `/` and the same race works for arbitrary requests.
//!
//! # Quick Example
//! ```no_run
//! use std::{net::SocketAddr, sync::Arc};
//!
//! use acme_dispatcher::{Dispatcher, HttpHandler, HyperTransport, config::load_config};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = load_config("config.toml").await?;
//! let transport = Arc::new(HyperTransport::new(cfg.upstream_timeout())?);
//! let dispatcher = Dispatcher::new(transport, &cfg)?;
//! let app = Arc::new(HttpHandler::new(dispatcher, cfg.path.clone())).router();
//! let listener = tokio::net::TcpListener::bind(&cfg.listen).await?;
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Hexagonal: the race itself lives in [`core`] and only talks to upstreams through the
//! [`ports::transport::Transport`] trait. [`adapters`] provide the hyper-based transport and
//! the axum endpoint. Tests swap the transport for scripted fakes.
//!
//! # Loop prevention
//! Every forwarded request carries the configured marker header set to `yes`. A dispatcher
//! that receives such a request answers 404 instead of forwarding it again.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{HttpHandler, HyperTransport},
    core::{DispatchOutcome, Dispatcher, Rejection},
    ports::transport::Transport,
    utils::GracefulShutdown,
};
