//! Configuration data structures for the dispatcher.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. Every field has
//! a default so a minimal config only needs the `forward` list. Unknown keys are rejected at
//! load time rather than silently ignored.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bind address for the challenge endpoint
pub const DEFAULT_LISTEN: &str = "[::1]:44046";
/// Default route pattern: the ACME HTTP-01 challenge subtree
pub const DEFAULT_PATH: &str = "/.well-known/acme-challenge/";
/// Default loop-prevention header name
pub const DEFAULT_CIRCULAR_PREVENTION: &str = "X-ACME-Dispatcher";

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

fn default_circular_prevention() -> String {
    DEFAULT_CIRCULAR_PREVENTION.to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

fn default_drain_timeout_secs() -> u64 {
    5
}

/// Output style for structured logs
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Top-level dispatcher configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Socket address the endpoint binds to
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Route pattern handed to the dispatcher. A trailing `/` matches the whole subtree.
    #[serde(default = "default_path")]
    pub path: String,

    /// Upstream base URLs, fanned out to concurrently
    #[serde(default)]
    pub forward: Vec<String>,

    /// Header used both to mark forwarded requests and to detect re-entry
    #[serde(default = "default_circular_prevention")]
    pub circular_prevention: String,

    /// Reject methods that are not idempotent with 405
    #[serde(default)]
    pub idempotent_only: bool,

    /// Per-attempt timeout until upstream response headers arrive
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// Bound on waiting for losing attempts to wind down after an outcome is chosen
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    #[serde(default)]
    pub log_format: LogFormat,
}

impl DispatcherConfig {
    /// Per-attempt upstream timeout as a [`Duration`]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Drain bound as a [`Duration`]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Upstream base URLs with any trailing `/` removed, ready to be joined with a
    /// normalized request path.
    pub fn upstreams(&self) -> Vec<String> {
        self.forward
            .iter()
            .map(|u| u.trim_end_matches('/').to_string())
            .collect()
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            forward: Vec::new(),
            circular_prevention: default_circular_prevention(),
            idempotent_only: false,
            upstream_timeout_secs: default_upstream_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            log_format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_acme_challenge_deployment() {
        let config = DispatcherConfig::default();
        assert_eq!(config.listen, "[::1]:44046");
        assert_eq!(config.path, "/.well-known/acme-challenge/");
        assert_eq!(config.circular_prevention, "X-ACME-Dispatcher");
        assert!(!config.idempotent_only);
        assert!(config.forward.is_empty());
    }

    #[test]
    fn test_upstreams_trim_trailing_slash() {
        let config = DispatcherConfig {
            forward: vec![
                "http://10.0.0.1:8080/".to_string(),
                "https://origin-b.example.com".to_string(),
            ],
            ..DispatcherConfig::default()
        };
        assert_eq!(
            config.upstreams(),
            vec![
                "http://10.0.0.1:8080".to_string(),
                "https://origin-b.example.com".to_string()
            ]
        );
    }
}
