//! Security-related configuration types for database connections
//!
//! This module provides the TLS/SSL settings a session connects with.

mod tls_config;

pub use tls_config::*;
