use std::net::SocketAddr;

use hyper::header::HeaderName;

use crate::config::models::DispatcherConfig;

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Dispatcher configuration validator
pub struct DispatcherConfigValidator;

impl DispatcherConfigValidator {
    /// Validate the entire configuration, collecting every problem found
    pub fn validate(config: &DispatcherConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen) {
            errors.push(e);
        }

        if !config.path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: "path".to_string(),
                message: format!("Route path '{}' must start with '/'", config.path),
            });
        }

        if config.forward.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "forward".to_string(),
            });
        }
        for (i, upstream) in config.forward.iter().enumerate() {
            if let Err(e) = Self::validate_upstream_url(upstream, &format!("forward[{i}]")) {
                errors.push(e);
            }
        }

        if HeaderName::from_bytes(config.circular_prevention.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidField {
                field: "circular_prevention".to_string(),
                message: format!(
                    "'{}' is not a valid HTTP header name",
                    config.circular_prevention
                ),
            });
        }

        if config.upstream_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "upstream_timeout_secs".to_string(),
                message: "Timeout must be greater than zero".to_string(),
            });
        }
        if config.drain_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "drain_timeout_secs".to_string(),
                message: "Timeout must be greater than zero".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '[::1]:44046')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Upstreams are base URLs: the request path is appended verbatim, so a query or
    /// fragment would end up in the middle of the outbound URL.
    fn validate_upstream_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                if url.query().is_some() || url.fragment().is_some() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "Upstream base URL must not carry a query or fragment"
                            .to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
