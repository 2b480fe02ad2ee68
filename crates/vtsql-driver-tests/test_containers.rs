//! Docker container management for integration tests.
//!
//! A single Dolt `sql-server` container is started lazily by the first test
//! that asks for it and reused by every later test in the process. The
//! testcontainers reaper removes it when the test binary exits.

use once_cell::sync::Lazy;
use std::time::Duration;
use testcontainers::{
    ContainerAsync, GenericImage, ImageExt,
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
};
use tokio::sync::Mutex;
use vtsql_core::ConnectionConfig;
use vtsql_driver_mysql::MySqlDriver;

const DOLT_IMAGE: &str = "dolthub/dolt-sql-server";
const DOLT_TAG: &str = "latest";
const DOLT_PORT: u16 = 3306;

/// Database created by the image at startup
pub const BOOTSTRAP_DATABASE: &str = "vtsql_bootstrap";

/// Information about the running server
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Host address (typically 127.0.0.1)
    pub host: String,
    /// Port number (randomly assigned by testcontainers)
    pub port: u16,
    /// User with rights to create databases
    pub username: String,
    /// Password for `username`, if any
    pub password: Option<String>,
    /// A database that always exists, used for administrative connections
    pub database: String,
}

impl ServerInfo {
    /// Connection settings for `database` on this server
    pub fn config_for(&self, database: &str) -> ConnectionConfig {
        let config = ConnectionConfig::new(&self.host, self.port, &self.username, database);
        match &self.password {
            Some(password) => config.with_password(password),
            None => config,
        }
    }
}

struct DoltContainer {
    #[allow(dead_code)]
    inner: ContainerAsync<GenericImage>,
    info: ServerInfo,
}

/// Held across startup so concurrent tests wait for one container
static DOLT_CONTAINER: Lazy<Mutex<Option<DoltContainer>>> = Lazy::new(|| Mutex::new(None));

/// Poll until the server accepts connections
async fn wait_until_ready(info: &ServerInfo) -> anyhow::Result<()> {
    let driver = MySqlDriver::new();
    let config = info.config_for(&info.database);
    let max_retries: u32 = 10;

    for attempt in 1..=max_retries {
        match driver.test_connection(&config).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < max_retries => {
                let delay = Duration::from_secs(u64::from(attempt.min(5)));
                tracing::warn!(
                    attempt = attempt,
                    delay_secs = delay.as_secs(),
                    "Dolt server not ready, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Dolt server not reachable after {} attempts: {}",
                    max_retries,
                    e
                ));
            }
        }
    }
    Ok(())
}

/// Get or create the Dolt test container
pub async fn dolt_container() -> anyhow::Result<ServerInfo> {
    let mut guard = DOLT_CONTAINER.lock().await;
    if let Some(ref container) = *guard {
        return Ok(container.info.clone());
    }

    tracing::info!("starting Dolt sql-server test container");

    let container = GenericImage::new(DOLT_IMAGE, DOLT_TAG)
        .with_exposed_port(DOLT_PORT.tcp())
        .with_wait_for(WaitFor::seconds(3))
        .with_env_var("DOLT_ROOT_HOST", "%")
        .with_env_var("DOLT_DATABASE", BOOTSTRAP_DATABASE)
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start dolt container: {}", e))?;

    let host_port = container
        .get_host_port_ipv4(DOLT_PORT.tcp())
        .await
        .map_err(|e| anyhow::anyhow!("failed to get dolt port: {}", e))?;

    let info = ServerInfo {
        host: "127.0.0.1".to_string(),
        port: host_port,
        username: "root".to_string(),
        password: None,
        database: BOOTSTRAP_DATABASE.to_string(),
    };
    wait_until_ready(&info).await?;
    tracing::info!(port = host_port, "Dolt test container ready");

    *guard = Some(DoltContainer {
        inner: container,
        info: info.clone(),
    });
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_dolt_container_starts() {
        let result = dolt_container().await;
        assert!(
            result.is_ok(),
            "Dolt container should start: {:?}",
            result.err()
        );

        if let Ok(info) = result {
            assert_eq!(info.host, "127.0.0.1");
            assert!(info.port > 0);
            assert_eq!(info.database, BOOTSTRAP_DATABASE);
        }
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_container_reuse() {
        let info1 = dolt_container().await.unwrap();
        let info2 = dolt_container().await.unwrap();

        assert_eq!(info1.port, info2.port, "Container should be reused");
    }
}
