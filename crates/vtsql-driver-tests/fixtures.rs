//! Test fixtures: server discovery, per-test databases and sessions
//!
//! Tests call [`test_session`] to get a [`VersionedSession`] on a brand new
//! database. The server is the shared Dolt container unless
//! `VTSQL_TEST_MANUAL_SERVER` is set, in which case the `DB_*` variables
//! describe an already running server.

use anyhow::{Context, Result};
use std::sync::Once;
use std::sync::atomic::{AtomicU32, Ordering};
use vtsql_core::{ConnectionConfig, SessionOptions, sql::quote_identifier};
use vtsql_driver_mysql::MySqlDriver;
use vtsql_session::VersionedSession;

use crate::test_containers::{ServerInfo, dolt_container};

/// Set to use a manually managed server instead of testcontainers
pub const ENV_MANUAL_SERVER: &str = "VTSQL_TEST_MANUAL_SERVER";

static TRACING: Once = Once::new();
static DATABASE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Install a test subscriber once per process; RUST_LOG controls verbosity
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// The server tests run against
pub async fn server() -> Result<ServerInfo> {
    if std::env::var(ENV_MANUAL_SERVER).is_ok_and(|v| !v.is_empty() && v != "0") {
        let config = ConnectionConfig::from_env()
            .context("manual server requested but DB_* variables are incomplete")?;
        return Ok(ServerInfo {
            host: config.host,
            port: config.port,
            username: config.user,
            password: config.password,
            database: config.database,
        });
    }
    dolt_container().await
}

/// Create an empty database named after `prefix` and return settings for it
///
/// A new Dolt database starts with a single commit on `main`.
pub async fn fresh_database(prefix: &str) -> Result<ConnectionConfig> {
    init_tracing();
    let server = server().await?;
    let name = format!(
        "{}_{}_{}",
        prefix,
        std::process::id(),
        DATABASE_COUNTER.fetch_add(1, Ordering::SeqCst)
    );

    let admin = MySqlDriver::new()
        .connect(&server.config_for(&server.database))
        .await
        .context("failed to open admin connection")?;
    let created = admin
        .execute(&format!("CREATE DATABASE {}", quote_identifier(&name)), &[])
        .await;
    admin.close().await?;
    created.with_context(|| format!("failed to create database {}", name))?;

    Ok(server.config_for(&name))
}

/// Session on a fresh database with default options
pub async fn test_session(prefix: &str) -> Result<VersionedSession> {
    test_session_with_options(prefix, SessionOptions::default()).await
}

pub async fn test_session_with_options(
    prefix: &str,
    options: SessionOptions,
) -> Result<VersionedSession> {
    let config = fresh_database(prefix).await?;
    VersionedSession::connect_with_options(&config, options)
        .await
        .context("failed to open session")
}

/// Employees table used across tests
pub const EMPLOYEES_DDL: &str = "CREATE TABLE employees (\
    id int NOT NULL, \
    last_name varchar(255), \
    first_name varchar(255), \
    PRIMARY KEY (id))";

pub const AUTHOR: &str = "Tester <tester@example.com>";

/// Session with an `employees` table holding four committed rows
pub async fn seeded_session(prefix: &str) -> Result<VersionedSession> {
    use vtsql_core::row_data;

    let session = test_session(prefix).await?;
    session.apply_schema(&[EMPLOYEES_DDL]).await?;
    session
        .upsert_rows(
            "employees",
            &[
                row_data! { "id" => 0, "last_name" => "Sehn", "first_name" => "Tim" },
                row_data! { "id" => 1, "last_name" => "Hendriks", "first_name" => "Brian" },
                row_data! { "id" => 2, "last_name" => "Son", "first_name" => "Aaron" },
                row_data! { "id" => 3, "last_name" => "Fitzgerald", "first_name" => "Brian" },
            ],
            &["id"],
        )
        .await?;
    session.commit(AUTHOR, "Seed employees").await?;
    Ok(session)
}

/// Row count of `table` on the session's active branch
pub async fn count_rows(session: &VersionedSession, table: &str) -> Result<i64> {
    let result = session
        .query(
            &format!("SELECT COUNT(*) AS n FROM {}", quote_identifier(table)),
            &[],
        )
        .await?;
    result
        .scalar()
        .and_then(|v| v.as_i64())
        .context("count query returned nothing")
}
