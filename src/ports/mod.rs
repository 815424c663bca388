pub mod transport;

pub use transport::{Transport, TransportError, TransportResult};
