//! TLS/SSL Configuration Types
//!
//! Defines how a session secures its connection to the database server.
//! Hosted servers usually present a certificate signed by a public CA
//! (`PlatformDefault`); self-hosted ones often ship their own CA bundle
//! (`CaFile`).

use crate::{Result, VtError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// TLS/SSL mode for database connections
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TlsMode {
    /// Plain TCP, no encryption
    #[default]
    Disabled,
    /// Encrypt and verify the server against a CA certificate file
    CaFile,
    /// Encrypt and verify the server against the platform trust store
    PlatformDefault,
}

impl TlsMode {
    /// Returns true if this mode encrypts the connection
    pub fn requires_encryption(&self) -> bool {
        !matches!(self, TlsMode::Disabled)
    }

    /// Returns true if this mode needs a CA certificate path
    pub fn requires_ca_file(&self) -> bool {
        matches!(self, TlsMode::CaFile)
    }

    /// The configuration spelling of this mode
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsMode::Disabled => "disabled",
            TlsMode::CaFile => "ca-file",
            TlsMode::PlatformDefault => "platform-default",
        }
    }
}

impl FromStr for TlsMode {
    type Err = VtError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "disable" | "off" | "false" => Ok(TlsMode::Disabled),
            "ca-file" | "ca_file" | "ca" => Ok(TlsMode::CaFile),
            "platform-default" | "platform_default" | "platform" | "system" => {
                Ok(TlsMode::PlatformDefault)
            }
            other => Err(VtError::Configuration(format!(
                "unknown TLS mode '{}' (expected disabled, ca-file or platform-default)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TlsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for TLS/SSL database connections
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlsConfig {
    /// TLS mode determining the level of security
    pub mode: TlsMode,
    /// Path to the CA certificate file, used with `TlsMode::CaFile`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
}

impl TlsConfig {
    /// Create a new TLS configuration with the specified mode
    pub fn new(mode: TlsMode) -> Self {
        Self {
            mode,
            ca_file: None,
        }
    }

    /// Create a disabled TLS configuration
    pub fn disabled() -> Self {
        Self::new(TlsMode::Disabled)
    }

    /// Verify the server with the platform trust store
    pub fn platform_default() -> Self {
        Self::new(TlsMode::PlatformDefault)
    }

    /// Verify the server against the CA certificate at `path`
    pub fn ca_file(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: TlsMode::CaFile,
            ca_file: Some(path.into()),
        }
    }

    /// Validate the TLS configuration
    pub fn validate(&self) -> Result<()> {
        match (&self.mode, &self.ca_file) {
            (TlsMode::CaFile, None) => Err(VtError::Configuration(
                "TLS mode ca-file requires a CA certificate path".to_string(),
            )),
            (TlsMode::CaFile, Some(path)) if path.as_os_str().is_empty() => Err(
                VtError::Configuration("CA certificate path cannot be empty".to_string()),
            ),
            (TlsMode::Disabled | TlsMode::PlatformDefault, Some(_)) => {
                Err(VtError::Configuration(format!(
                    "a CA certificate path is only used with ca-file, not {}",
                    self.mode
                )))
            }
            _ => Ok(()),
        }
    }
}
