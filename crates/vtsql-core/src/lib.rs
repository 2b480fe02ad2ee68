//! vtsql Core - shared abstractions for the versioned-table session client
//!
//! This crate provides the types every other vtsql crate depends on:
//!
//! - `Connection` / `Transaction` - traits a SQL driver implements
//! - `ConnectionConfig`, `TlsConfig`, `SessionOptions` - typed configuration
//! - `Value`, `Row`, `QueryResult` - driver-neutral result types
//! - Version-control domain types (`CommitRecord`, `DiffEntry`, `MergeResult`, ...)
//! - `VtError` - the error taxonomy shared by drivers and the session facade

mod config;
mod connection;
mod error;
pub mod security;
pub mod sql;
mod types;
mod versioning;

pub use config::*;
pub use connection::*;
pub use error::*;
pub use security::*;
pub use types::*;
pub use versioning::*;
