//! Connection and session configuration
//!
//! Configuration is plain data with builder methods. The walkthrough binary
//! fills it from the environment through [`ConnectionConfig::from_env`];
//! library callers usually build it directly.

use crate::{Result, TlsConfig, TlsMode, VtError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable naming the database host
pub const ENV_HOST: &str = "DB_HOST";
/// Environment variable naming the database port
pub const ENV_PORT: &str = "DB_PORT";
/// Environment variable naming the database user
pub const ENV_USER: &str = "DB_USER";
/// Environment variable holding the database password
pub const ENV_PASSWORD: &str = "DB_PASSWORD";
/// Environment variable naming the database
pub const ENV_DATABASE: &str = "DB_NAME";
/// Environment variable pointing at a CA certificate file
pub const ENV_SSL_CA: &str = "DB_SSL_CA";
/// Environment variable selecting the TLS mode explicitly
pub const ENV_SSL_MODE: &str = "DB_SSL_MODE";
/// Environment variable selecting the transaction failure policy
pub const ENV_ON_TRANSACTION_ERROR: &str = "VTSQL_ON_TRANSACTION_ERROR";

/// Default MySQL-protocol port
pub const DEFAULT_PORT: u16 = 3306;

/// Pool sizing for a session's connection pool
///
/// A session pins one connection; the remaining capacity is headroom for
/// further sessions sharing the same pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolSettings {
    /// Connections kept open while idle
    pub min_idle: usize,
    /// Upper bound on open connections
    pub max_size: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_idle: 0,
            max_size: 7,
        }
    }
}

impl PoolSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(VtError::Configuration(
                "pool max_size must be greater than 0".to_string(),
            ));
        }
        if self.min_idle > self.max_size {
            return Err(VtError::Configuration(format!(
                "pool min_idle ({}) cannot exceed max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        Ok(())
    }
}

/// Everything needed to open a session against the database server
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    pub database: String,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub pool: PoolSettings,
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("tls", &self.tls)
            .field("pool", &self.pool)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: None,
            database: database.into(),
            tls: TlsConfig::default(),
            pool: PoolSettings::default(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    /// Read the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup
    ///
    /// `DB_HOST`, `DB_USER` and `DB_NAME` are required. `DB_PORT` defaults to
    /// 3306. TLS is enabled with `ca-file` when `DB_SSL_CA` is set, unless
    /// `DB_SSL_MODE` picks a mode explicitly.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| {
                VtError::Configuration(format!("missing environment variable {}", key))
            })
        };

        let host = required(ENV_HOST)?;
        let user = required(ENV_USER)?;
        let database = required(ENV_DATABASE)?;
        let port = match var(ENV_PORT) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                VtError::Configuration(format!("invalid {} '{}': {}", ENV_PORT, raw, e))
            })?,
            None => DEFAULT_PORT,
        };

        let ca_file = var(ENV_SSL_CA).map(PathBuf::from);
        let mode = match var(ENV_SSL_MODE) {
            Some(raw) => raw.parse::<TlsMode>()?,
            None if ca_file.is_some() => TlsMode::CaFile,
            None => TlsMode::Disabled,
        };
        let tls = TlsConfig {
            mode,
            ca_file: if mode == TlsMode::CaFile { ca_file } else { None },
        };
        tls.validate()?;

        Ok(Self {
            host,
            port,
            user,
            password: lookup(ENV_PASSWORD),
            database,
            tls,
            pool: PoolSettings::default(),
        })
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(VtError::Configuration("host cannot be empty".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(VtError::Configuration(
                "database cannot be empty".to_string(),
            ));
        }
        self.tls.validate()?;
        self.pool.validate()
    }
}

/// What `with_transaction` does after rolling back failed work
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionErrorPolicy {
    /// Return the failure to the caller
    #[default]
    Propagate,
    /// Log the failure and report success without a value
    Suppress,
}

impl FromStr for TransactionErrorPolicy {
    type Err = VtError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "propagate" => Ok(Self::Propagate),
            "suppress" => Ok(Self::Suppress),
            other => Err(VtError::Configuration(format!(
                "unknown transaction error policy '{}' (expected propagate or suppress)",
                other
            ))),
        }
    }
}

/// Behavioural switches of a versioned session
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionOptions {
    #[serde(default)]
    pub on_transaction_error: TransactionErrorPolicy,
}

impl SessionOptions {
    pub fn with_transaction_error_policy(mut self, policy: TransactionErrorPolicy) -> Self {
        self.on_transaction_error = policy;
        self
    }

    /// Read session options from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let on_transaction_error = match lookup(ENV_ON_TRANSACTION_ERROR) {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => TransactionErrorPolicy::default(),
        };
        Ok(Self {
            on_transaction_error,
        })
    }
}
