//! MySQL TLS Support
//!
//! Translates a [`TlsConfig`] into `mysql_async` SSL options.

use anyhow::{Context, Result};
use mysql_async::SslOpts;
use std::path::Path;
use tracing::{debug, info};
use vtsql_core::security::{TlsConfig, TlsMode};

/// Error types for MySQL TLS operations
#[derive(Debug, thiserror::Error)]
pub enum MysqlTlsError {
    /// Failed to load CA certificate
    #[error("Failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),
}

/// A MySQL TLS/SSL options builder
///
/// # Example
///
/// ```ignore
/// let ssl_opts = MysqlTlsConnector::build(&TlsConfig::ca_file("/certs/ca.pem"))?;
/// let opts = OptsBuilder::default().ssl_opts(ssl_opts);
/// ```
#[derive(Debug, Clone)]
pub struct MysqlTlsConnector;

impl MysqlTlsConnector {
    /// Build SSL options from configuration
    ///
    /// Returns `None` when TLS is disabled. Every enabled mode verifies both
    /// the certificate chain and the server hostname; the modes differ only in
    /// which roots are trusted.
    pub fn build(config: &TlsConfig) -> Result<Option<SslOpts>> {
        config
            .validate()
            .map_err(|e| MysqlTlsError::ConfigurationError(e.to_string()))
            .context("Invalid TLS configuration")?;

        match config.mode {
            TlsMode::Disabled => {
                debug!("TLS disabled, returning None for SSL options");
                Ok(None)
            }
            TlsMode::PlatformDefault => {
                info!("Building MySQL SSL options with platform trust roots");
                Ok(Some(SslOpts::default()))
            }
            TlsMode::CaFile => {
                let path = config.ca_file.as_deref().ok_or_else(|| {
                    MysqlTlsError::ConfigurationError(
                        "ca-file mode without a CA certificate path".to_string(),
                    )
                })?;
                info!(ca_file = %path.display(), "Building MySQL SSL options with custom CA");
                let ssl_opts = apply_ca_cert(SslOpts::default(), path)?;
                Ok(Some(ssl_opts))
            }
        }
    }
}

/// Load and apply a CA certificate to the SSL options
///
/// Built-in roots are disabled so only the given CA is trusted.
fn apply_ca_cert(ssl_opts: SslOpts, path: &Path) -> Result<SslOpts> {
    debug!(path = %path.display(), "Adding CA certificate to SSL options");

    if !path.is_file() {
        return Err(MysqlTlsError::CaCertLoadFailed {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        }
        .into());
    }

    // mysql_async SslOpts accepts paths directly and loads them at connect time
    let ssl_opts = ssl_opts
        .with_root_certs(vec![path.to_path_buf().into()])
        .with_disable_built_in_roots(true);

    Ok(ssl_opts)
}

/// MySQL `ssl-mode` spelling of a TLS mode, used when rendering connection
/// strings for logs
pub fn tls_mode_to_ssl_mode(mode: TlsMode) -> &'static str {
    match mode {
        TlsMode::Disabled => "DISABLED",
        TlsMode::CaFile => "VERIFY_IDENTITY",
        TlsMode::PlatformDefault => "VERIFY_IDENTITY",
    }
}
