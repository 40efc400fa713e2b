//! Error types for txdb

use std::fmt;

use thiserror::Error;

use crate::Savepoint;

/// Which savepoint command failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavepointAction {
    /// `SAVEPOINT <name>`
    Create,
    /// `ROLLBACK TO SAVEPOINT <name>`
    RollbackTo,
}

impl fmt::Display for SavepointAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SavepointAction::Create => write!(f, "create"),
            SavepointAction::RollbackTo => write!(f, "roll back to"),
        }
    }
}

/// Core error type for txdb operations
#[derive(Error, Debug)]
pub enum TxdbError {
    /// The real database could not be reached or a transaction could not be started on it
    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement or query failed, including failures while reading its results
    #[error("Query error: {0}")]
    Query(String),

    /// A savepoint command failed
    #[error("Failed to {action} savepoint {name}: {message}")]
    Savepoint {
        action: SavepointAction,
        name: String,
        message: String,
    },

    /// Rollback was requested with no nested transaction outstanding
    #[error("No active savepoint to roll back to")]
    NoActiveSavepoint,

    /// Rolling back the shared transaction failed
    #[error("Rollback error: {0}")]
    Rollback(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The logical connection, statement or shared transaction was already closed
    #[error("Connection is closed")]
    Closed,

    /// A query produced more rows than the configured buffer limit
    #[error("Result exceeds the limit of {limit} buffered rows")]
    ResultTooLarge { limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,
}

impl TxdbError {
    /// Wrap a failed savepoint command
    pub fn savepoint(action: SavepointAction, savepoint: &Savepoint, source: TxdbError) -> Self {
        TxdbError::Savepoint {
            action,
            name: savepoint.name().to_string(),
            message: source.to_string(),
        }
    }

    /// Whether this error came from establishing the real database connection
    pub fn is_connection(&self) -> bool {
        matches!(self, TxdbError::Connection(_))
    }
}

/// Result type alias for txdb operations
pub type Result<T> = std::result::Result<T, TxdbError>;
