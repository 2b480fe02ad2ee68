//! MySQL driver entry point

use std::sync::Arc;
use vtsql_core::{Connection, ConnectionConfig, Result};

use crate::{MySqlConnection, tls_mode_to_ssl_mode};

/// MySQL-protocol database driver
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDriver;

impl MySqlDriver {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &'static str {
        "mysql"
    }

    pub fn default_port(&self) -> u16 {
        vtsql_core::DEFAULT_PORT
    }

    /// Open a pooled connection with a pinned session connection
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let conn = MySqlConnection::connect(config).await.inspect_err(|e| {
            tracing::error!(error = %e, "failed to connect to MySQL-protocol server");
        })?;
        tracing::info!(connection = %self.build_connection_string(config), "MySQL connection created");
        Ok(Arc::new(conn))
    }

    /// Open a connection, run `SELECT 1` and close it again
    #[tracing::instrument(skip(self, config))]
    pub async fn test_connection(&self, config: &ConnectionConfig) -> Result<()> {
        tracing::debug!("testing MySQL connection");
        let conn = self.connect(config).await?;
        let outcome = conn.query("SELECT 1", &[]).await;
        conn.close().await?;
        outcome.map(|_| ())
    }

    /// Connection URL for logs, with the password masked
    pub fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        let mut conn_str = String::from("mysql://");
        conn_str.push_str(&config.user);
        if config.password.is_some() {
            conn_str.push_str(":***");
        }
        conn_str.push('@');
        conn_str.push_str(&format!("{}:{}", config.host, config.port));
        conn_str.push('/');
        conn_str.push_str(&config.database);
        conn_str.push_str("?ssl-mode=");
        conn_str.push_str(tls_mode_to_ssl_mode(config.tls.mode));
        conn_str
    }
}
