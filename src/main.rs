//! Hookrelay notification relay.
//!
//! Main entry point. Loads configuration, starts the delivery lanes and the
//! ingress listener, and exits on the first termination signal.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hookrelay_api::{
    server::shutdown_signal,
    tls::{install_crypto_provider, load_rustls_config},
    AppState, Config,
};
use hookrelay_delivery::DeliveryEngine;
use tracing::{error, info, warn};

/// Exit code used when the relay stops on a signal.
const SIGNAL_EXIT_CODE: i32 = 2;

/// One-directional HTTPS notification relay.
#[derive(Debug, Parser)]
#[command(name = "hookrelay", version, about)]
struct Cli {
    /// Enable debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (defaults to ./hookrelay.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen port
    #[arg(long)]
    port: Option<u16>,

    /// Number of concurrent delivery lanes
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-attempt delivery timeout in milliseconds
    #[arg(long = "timeout-ms", value_name = "MS")]
    timeout_ms: Option<u64>,

    /// PEM certificate chain for the HTTPS listener
    #[arg(long, value_name = "FILE", requires = "key")]
    cert: Option<PathBuf>,

    /// PEM private key for the HTTPS listener
    #[arg(long, value_name = "FILE", requires = "cert")]
    key: Option<PathBuf>,
}

impl Cli {
    /// Applies command line flags over loaded configuration.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.delivery_timeout_ms = timeout_ms;
        }
        if let Some(cert) = &self.cert {
            config.tls_cert_path = Some(cert.clone());
        }
        if let Some(key) = &self.key {
            config.tls_key_path = Some(key.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_from(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(if cli.verbose { "debug" } else { &config.log_level });
    install_panic_hook();
    install_crypto_provider();

    info!(
        host = %config.host,
        port = config.port,
        ingest_path = %config.ingest_path,
        concurrency = config.concurrency,
        timeout_ms = config.delivery_timeout_ms,
        max_queue_depth = ?config.max_queue_depth,
        tls = config.tls_paths().is_some(),
        "Configuration loaded"
    );

    let tls = match config.tls_paths() {
        Some((cert, key)) => Some(load_rustls_config(cert, key).await?),
        None => None,
    };

    let mut engine = DeliveryEngine::new(config.to_delivery_config())
        .context("Failed to create delivery engine")?;
    engine.start().await.context("Failed to start delivery engine")?;

    let state = AppState {
        queue: engine.queue(),
        stats: engine.stats_handle(),
        target_header: config.target_header_name()?,
        max_body_bytes: config.max_body_bytes,
    };
    let router = hookrelay_api::create_router(state, &config.ingest_path);
    let addr = config.parse_server_addr()?;

    info!(addr = %addr, "Hookrelay is ready to receive notifications");

    tokio::select! {
        result = hookrelay_api::start_server(router, addr, tls) => {
            if let Err(e) = result {
                error!(error = %e, "Server failed");
                return Err(e).context("Server failed");
            }
        },
        signal = shutdown_signal() => {
            warn!(
                signal,
                queued = engine.queue().depth(),
                "Shutdown signal received, exiting without draining the queue"
            );
            std::process::exit(SIGNAL_EXIT_CODE);
        },
    }

    engine.shutdown().await?;
    Ok(())
}

/// Initializes tracing with environment-based configuration.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Routes panics from any task into the log.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "unknown panic payload".to_string()
        };
        let location = panic_info
            .location()
            .map(|location| format!("{}:{}", location.file(), location.line()))
            .unwrap_or_default();

        error!(location = %location, "Unexpected panic: {}", message);
    }));
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_configuration() {
        let cli = Cli::try_parse_from([
            "hookrelay",
            "-v",
            "--port",
            "8443",
            "--concurrency",
            "4",
            "--timeout-ms",
            "750",
            "--cert",
            "cert.pem",
            "--key",
            "key.pem",
        ])
        .unwrap();
        let mut config = Config::default();

        cli.apply_overrides(&mut config);

        assert!(cli.verbose);
        assert_eq!(config.port, 8443);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.delivery_timeout_ms, 750);
        assert!(config.tls_paths().is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn absent_flags_keep_configuration() {
        let cli = Cli::try_parse_from(["hookrelay"]).unwrap();
        let mut config = Config { port: 6000, ..Config::default() };

        cli.apply_overrides(&mut config);

        assert!(!cli.verbose);
        assert_eq!(config.port, 6000);
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn cert_without_key_rejected() {
        assert!(Cli::try_parse_from(["hookrelay", "--cert", "cert.pem"]).is_err());
    }
}
