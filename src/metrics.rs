//! Lightweight metrics helpers for the dispatcher.
//!
//! Thin wrappers over the `metrics` crate macros. No exporter is embedded; the embedding
//! application installs whichever recorder it wants and these calls become no-ops without one.
//!
//! Provided metrics:
//! * `acme_dispatcher_dispatch_total` (counter, label `outcome`)
//! * `acme_dispatcher_dispatch_duration_seconds` (histogram, label `outcome`)
//! * `acme_dispatcher_attempts_total` (counter, label `result`)
use std::time::Duration;

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

pub const DISPATCH_TOTAL: &str = "acme_dispatcher_dispatch_total";
pub const DISPATCH_DURATION_SECONDS: &str = "acme_dispatcher_dispatch_duration_seconds";
pub const ATTEMPTS_TOTAL: &str = "acme_dispatcher_attempts_total";

static DESCRIBED: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        DISPATCH_TOTAL,
        Unit::Count,
        "Inbound requests by dispatch outcome (winner, fallback_error, gateway_failure, rejected)."
    );
    describe_histogram!(
        DISPATCH_DURATION_SECONDS,
        Unit::Seconds,
        "Time from admission until an outcome was chosen."
    );
    describe_counter!(
        ATTEMPTS_TOTAL,
        Unit::Count,
        "Upstream attempts by result (success, failure_status, transport_error, cancelled)."
    );
});

/// Record the outcome of one dispatch call.
pub fn record_dispatch(outcome: &'static str, elapsed: Duration) {
    Lazy::force(&DESCRIBED);
    counter!(DISPATCH_TOTAL, "outcome" => outcome).increment(1);
    histogram!(DISPATCH_DURATION_SECONDS, "outcome" => outcome).record(elapsed.as_secs_f64());
}

/// Record how a single upstream attempt ended.
pub fn record_attempt(result: &'static str) {
    Lazy::force(&DESCRIBED);
    counter!(ATTEMPTS_TOTAL, "result" => result).increment(1);
}
