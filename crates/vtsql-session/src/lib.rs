//! vtsql Session - typed version-control operations over a SQL connection
//!
//! [`VersionedSession`] is the entry point: it connects through the
//! MySQL-protocol driver and turns branch, commit, diff, merge and reset
//! requests into the engine's procedures and system tables.
//!
//! - [`commands`] - the statements sent to the engine
//! - [`report`] - text renderings of results for logs and terminals

pub mod commands;
mod decode;
pub mod report;
mod session;

#[cfg(test)]
mod mock;

pub use session::VersionedSession;
pub use vtsql_core::{
    BranchError, BranchInfo, CommitHash, CommitRecord, CommitRef, ConflictSummary,
    ConnectionConfig, DiffEntry, DiffType, MergeResult, Result, RowData, SessionOptions,
    StatusEntry, TlsConfig, TlsMode, Transaction, TransactionErrorPolicy, Value, VtError, row_data,
};
