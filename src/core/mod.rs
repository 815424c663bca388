pub mod dispatcher;
pub mod forwarding;
pub mod outcome;

pub use dispatcher::{Dispatcher, InboundRequest, MAX_BODY_BYTES, is_success};
pub use outcome::{DispatchOutcome, Rejection};
