//! TLS material loading for the ingress listener.

use std::path::Path;

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use tracing::{debug, info};

/// Installs the process-wide rustls crypto provider.
///
/// Safe to call more than once; later calls keep the provider already
/// installed.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }
}

/// Loads a PEM certificate chain and private key into a server config.
///
/// # Errors
///
/// Fails if either file is missing or the PEM contents cannot be used.
pub async fn load_rustls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig> {
    install_crypto_provider();

    if !cert_path.exists() {
        anyhow::bail!("TLS certificate {} does not exist", cert_path.display());
    }
    if !key_path.exists() {
        anyhow::bail!("TLS private key {} does not exist", key_path.display());
    }

    let config = RustlsConfig::from_pem_file(cert_path, key_path).await.with_context(|| {
        format!(
            "failed to load TLS material from {} and {}",
            cert_path.display(),
            key_path.display()
        )
    })?;

    info!(cert = %cert_path.display(), "TLS material loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn missing_certificate_rejected() {
        let key = tempfile::NamedTempFile::new().unwrap();

        let result = load_rustls_config(Path::new("/nonexistent/cert.pem"), key.path()).await;

        let error = result.unwrap_err().to_string();
        assert!(error.contains("certificate"), "unexpected error: {error}");
    }

    #[tokio::test]
    async fn garbage_pem_rejected() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        let mut key = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "not a certificate").unwrap();
        writeln!(key, "not a key").unwrap();

        assert!(load_rustls_config(cert.path(), key.path()).await.is_err());
    }
}
