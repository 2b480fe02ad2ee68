//! Error types for vtsql

use thiserror::Error;

/// Core error type for vtsql operations
#[derive(Error, Debug)]
pub enum VtError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Branch error: {0}")]
    Branch(#[from] BranchError),

    #[error("Schema error: {0}")]
    Schema(String),

    /// Work inside `with_transaction` failed and the transaction was rolled back
    #[error("Transaction rolled back: {0}")]
    Transaction(#[source] Box<VtError>),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The engine answered with a result set we could not decode
    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failures of branch-level commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BranchError {
    #[error("branch '{0}' not found")]
    NotFound(String),

    #[error("branch '{0}' already exists")]
    AlreadyExists(String),

    /// The engine refuses to delete the branch a session is standing on
    #[error("branch '{0}' is currently checked out")]
    CheckedOut(String),

    #[error("branch command on '{branch}' failed: {message}")]
    Engine { branch: String, message: String },
}

impl VtError {
    /// Returns true if this error (or the error a rolled back transaction wraps)
    /// is a branch error
    pub fn is_branch_error(&self) -> bool {
        match self {
            VtError::Branch(_) => true,
            VtError::Transaction(inner) => inner.is_branch_error(),
            _ => false,
        }
    }
}

/// Result type alias for vtsql operations
pub type Result<T> = std::result::Result<T, VtError>;
