//! Configuration management for the relay service.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use axum::http::HeaderName;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use hookrelay_delivery::{ClientConfig, DeliveryConfig, QueueConfig};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "hookrelay.toml";
const ENV_PREFIX: &str = "HOOKRELAY_";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed `HOOKRELAY_` (highest priority)
/// 2. Configuration file (`hookrelay.toml` or an explicit path)
/// 3. Built-in defaults (lowest priority)
///
/// Command line flags are applied on top by the binary.
///
/// # Example
///
/// ```no_run
/// use hookrelay_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Relay will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Listen address.
    ///
    /// Environment variable: `HOOKRELAY_HOST`
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    ///
    /// Environment variable: `HOOKRELAY_PORT`
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path of the ingest endpoint.
    ///
    /// Environment variable: `HOOKRELAY_INGEST_PATH`
    #[serde(default = "default_ingest_path")]
    pub ingest_path: String,
    /// Header carrying the delivery target.
    ///
    /// Environment variable: `HOOKRELAY_TARGET_HEADER`
    #[serde(default = "default_target_header")]
    pub target_header: String,
    /// Largest accepted inbound body in bytes.
    ///
    /// Environment variable: `HOOKRELAY_MAX_BODY_BYTES`
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    // Delivery
    /// Number of delivery lanes.
    ///
    /// Environment variable: `HOOKRELAY_CONCURRENCY`
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-attempt timeout in milliseconds.
    ///
    /// Environment variable: `HOOKRELAY_DELIVERY_TIMEOUT_MS`
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    /// Optional queue depth limit; unbounded when unset.
    ///
    /// Environment variable: `HOOKRELAY_MAX_QUEUE_DEPTH`
    #[serde(default)]
    pub max_queue_depth: Option<usize>,

    // TLS
    /// PEM certificate chain.
    ///
    /// Environment variable: `HOOKRELAY_TLS_CERT_PATH`
    #[serde(default)]
    pub tls_cert_path: Option<PathBuf>,
    /// PEM private key.
    ///
    /// Environment variable: `HOOKRELAY_TLS_KEY_PATH`
    #[serde(default)]
    pub tls_key_path: Option<PathBuf>,

    // Logging
    /// Default log filter when `RUST_LOG` is unset.
    ///
    /// Environment variable: `HOOKRELAY_LOG_LEVEL`
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from defaults, `hookrelay.toml` if present, and
    /// environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration using an explicit file instead of `hookrelay.toml`.
    ///
    /// # Errors
    ///
    /// Fails if an explicit file does not exist, a value cannot be parsed, or
    /// validation rejects the result.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("configuration file {} does not exist", path.display());
                }
                path.to_path_buf()
            },
            None => PathBuf::from(CONFIG_FILE),
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Per-attempt delivery timeout.
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Convert to the delivery crate's engine configuration.
    pub fn to_delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            worker_count: self.concurrency,
            queue: QueueConfig { max_depth: self.max_queue_depth },
            client_config: self.to_client_config(),
            shutdown_timeout: self.delivery_timeout() + Duration::from_secs(1),
        }
    }

    /// Convert to client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig { timeout: self.delivery_timeout(), ..ClientConfig::default() }
    }

    /// Parse server socket address from host and port configuration.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Target header as a typed header name.
    pub fn target_header_name(&self) -> Result<HeaderName> {
        HeaderName::from_str(&self.target_header)
            .with_context(|| format!("invalid target header name '{}'", self.target_header))
    }

    /// Certificate and key paths when TLS is configured.
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }

    /// Validate configuration values.
    ///
    /// Called by the loaders; call it again after applying overrides.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than 0");
        }

        if self.delivery_timeout_ms == 0 {
            anyhow::bail!("delivery_timeout_ms must be greater than 0");
        }

        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be greater than 0");
        }

        if self.max_queue_depth == Some(0) {
            anyhow::bail!("max_queue_depth must be greater than 0 when set");
        }

        if !self.ingest_path.starts_with('/') {
            anyhow::bail!("ingest_path must start with '/'");
        }

        if self.ingest_path == "/health" {
            anyhow::bail!("ingest_path must not shadow the health endpoint");
        }

        self.target_header_name()?;

        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            anyhow::bail!("tls_cert_path and tls_key_path must be set together");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ingest_path: default_ingest_path(),
            target_header: default_target_header(),
            max_body_bytes: default_max_body_bytes(),
            concurrency: default_concurrency(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            max_queue_depth: None,
            tls_cert_path: None,
            tls_key_path: None,
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_ingest_path() -> String {
    "/integration".to_string()
}

fn default_target_header() -> String {
    "X-Target".to_string()
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_concurrency() -> usize {
    hookrelay_delivery::DEFAULT_WORKER_COUNT
}

fn default_delivery_timeout_ms() -> u64 {
    hookrelay_delivery::DEFAULT_TIMEOUT_MS
}

fn default_log_level() -> String {
    "info".to_string()
}
