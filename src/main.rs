use std::{net::SocketAddr, path::Path, sync::Arc};

use acme_dispatcher::{
    adapters::{HttpHandler, HyperTransport},
    config::{DispatcherConfig, DispatcherConfigValidator, load_config},
    core::Dispatcher,
    ports::transport::Transport,
    tracing_setup,
    utils::GracefulShutdown,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Log filter directive (e.g. `debug` or `acme_dispatcher=trace,access=info`).
    /// Overrides `RUST_LOG`.
    #[clap(long, global = true)]
    log_level: Option<String>,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the dispatcher (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config, args.log_level.as_deref()).await,
        None => serve(&args.config, args.log_level.as_deref()).await,
    }
}

async fn serve(config_path: &str, log_level: Option<&str>) -> Result<()> {
    let config: DispatcherConfig = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    DispatcherConfigValidator::validate(&config)
        .map_err(|e| eyre!("Invalid configuration in {config_path}: {e}"))?;

    match log_level {
        Some(level) => tracing_setup::init_tracing_with_level(level, config.log_format),
        None => tracing_setup::init_tracing(config.log_format),
    }
    .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    let transport: Arc<dyn Transport> = Arc::new(
        HyperTransport::new(config.upstream_timeout())
            .context("Failed to create upstream transport")?,
    );
    let dispatcher =
        Dispatcher::new(transport, &config).context("Failed to build dispatcher")?;

    let upstream_count = dispatcher.upstream_count();
    for upstream in &config.forward {
        tracing::info!("Forwarding to {}", upstream);
    }

    let handler = Arc::new(HttpHandler::new(dispatcher, config.path.clone()));
    let app = handler.router();

    let addr: SocketAddr = config
        .listen
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!(
        "ACME dispatcher listening on {} (path {}, {} upstreams, loop header {})",
        addr,
        config.path,
        upstream_count,
        config.circular_prevention
    );

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let shutdown = graceful_shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let reason = shutdown.wait_for_shutdown_signal().await;
        tracing::info!("Shutdown signal received: {:?}", reason);
    })
    .await
    .context("Server error")?;

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match DispatcherConfigValidator::validate(&config) {
        Ok(()) => {
            println!("Configuration validation: OK");
            println!();
            println!("Configuration Summary:");
            println!("   Listen Address: {}", config.listen);
            println!("   Path: {}", config.path);
            println!("   Loop-prevention Header: {}", config.circular_prevention);
            println!("   Idempotent Methods Only: {}", config.idempotent_only);
            println!("   Upstreams ({}):", config.forward.len());
            for upstream in &config.forward {
                println!("     - {upstream}");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration validation failed:");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# ACME dispatcher configuration

# Address the challenge endpoint listens on
listen = "[::1]:44046"

# Requests under this path are dispatched. A trailing "/" matches the whole subtree;
# set it to "/" to dispatch every request.
path = "/.well-known/acme-challenge/"

# Every origin sharing the hostname. Each request is sent to all of them at once.
forward = [
    "http://10.0.0.1:80",
    "http://10.0.0.2:80",
]

# Header marking forwarded requests. A request arriving with it set to "yes" is not
# forwarded again.
circular_prevention = "X-ACME-Dispatcher"

# Answer 405 for methods that are not idempotent
# idempotent_only = false

# upstream_timeout_secs = 30
# drain_timeout_secs = 5
# log_format = "pretty"  # or "json"
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("Created default configuration at: {config_path}");
    println!("   Run 'acme-dispatcher serve --config {config_path}' to start the dispatcher");
    Ok(())
}
