use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

/// Initialize structured logging in the configured format.
///
/// `RUST_LOG` takes precedence; without it everything at `info` and above is logged.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    init_with_filter(env_filter, format)
}

/// Initialize tracing with an explicit filter directive such as `debug` or
/// `acme_dispatcher=trace,access=info`.
pub fn init_tracing_with_level(level: &str, format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?;
    init_with_filter(env_filter, format)
}

fn init_with_filter(env_filter: EnvFilter, format: LogFormat) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(false)
                    .with_span_list(true),
            )
            .try_init()
            .wrap_err("Failed to install JSON tracing subscriber")?,
        LogFormat::Pretty => Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
            .wrap_err("Failed to install console tracing subscriber")?,
    }

    tracing::info!("Logging initialized ({:?})", format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_rejected() {
        let result = init_tracing_with_level("acme_dispatcher=verbose", LogFormat::Json);
        assert!(result.is_err());
    }

    #[test]
    fn test_second_init_reports_error() {
        // Whichever call runs first installs the subscriber; later ones must not panic
        let _ = init_tracing_with_level("debug", LogFormat::Json);
        assert!(init_tracing_with_level("debug", LogFormat::Pretty).is_err());
    }
}
