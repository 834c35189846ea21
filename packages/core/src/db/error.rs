//! Database Error Types
//!
//! This module defines error types for persistence operations, providing
//! clear error handling for connection, initialization, query and
//! transaction failures.

use std::path::PathBuf;
use thiserror::Error;

/// Persistence operation errors
///
/// Every variant describes a storage-layer problem. Request-shape problems
/// (unknown parent, duplicate slug, ...) are detected by the service layer
/// before anything is written.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[cfg(feature = "turso")]
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[cfg(feature = "turso")]
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// A stored row could not be decoded
    #[error("Invalid row for category {id}: {reason}")]
    InvalidRow { id: String, reason: String },

    /// A change set referenced a row that does not exist
    #[error("Row not found: {id}")]
    RowNotFound { id: String },

    /// A change set would violate a uniqueness constraint
    #[error("Constraint violated: {context}")]
    ConstraintViolation { context: String },

    /// The change set was rolled back
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },
}

impl DatabaseError {
    /// Create a connection failed error
    #[cfg(feature = "turso")]
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    pub fn invalid_row(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRow {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn row_not_found(id: impl Into<String>) -> Self {
        Self::RowNotFound { id: id.into() }
    }

    pub fn constraint_violation(context: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            context: context.into(),
        }
    }

    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }
}
