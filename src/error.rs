//! Error types for the catalog reconciler

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes recorded in import reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NoTitleMatch,
    AmbiguousTitleMatch,
    MalformedRow,
    StorageConflict,
    TransactionFailure,
    ConnectionLost,
    NotFound,
    BadValue,
    DbFailure,
    Failure,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("No title match: {0}")]
    NoTitleMatch(String),

    #[error("Ambiguous title match for '{title}': books {candidates:?}")]
    AmbiguousTitleMatch { title: String, candidates: Vec<i32> },

    #[error("Malformed row: {0}")]
    MalformedRow(String),

    #[error("Storage conflict: {0}")]
    StorageConflict(String),

    #[error("Transaction failure: {0}")]
    TransactionFailure(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

}

impl AppError {
    /// Code recorded in row outcomes
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::NoTitleMatch(_) => ErrorCode::NoTitleMatch,
            AppError::AmbiguousTitleMatch { .. } => ErrorCode::AmbiguousTitleMatch,
            AppError::MalformedRow(_) => ErrorCode::MalformedRow,
            AppError::StorageConflict(_) => ErrorCode::StorageConflict,
            AppError::TransactionFailure(_) => ErrorCode::TransactionFailure,
            AppError::ConnectionLost(_) => ErrorCode::ConnectionLost,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Database(e) if is_connection_error(e) => ErrorCode::ConnectionLost,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Config(_) => ErrorCode::Failure,
        }
    }

    /// True when the storage connection is gone and the rest of a batch cannot run.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::ConnectionLost(_) => true,
            AppError::Database(e) => is_connection_error(e),
            _ => false,
        }
    }

    /// Wrap a failure that happened while a row transaction was open.
    ///
    /// Fatal errors are kept as-is so the batch can stop; everything else is
    /// reported as a transaction failure for that row.
    pub fn into_transaction_failure(self) -> AppError {
        match self {
            e if e.is_fatal() => e,
            AppError::Database(e) => AppError::TransactionFailure(e.to_string()),
            other => other,
        }
    }
}

fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AppError::ConnectionLost("gone".into()).is_fatal());
        assert!(AppError::Database(sqlx::Error::PoolClosed).is_fatal());
        assert!(!AppError::Database(sqlx::Error::RowNotFound).is_fatal());
        assert!(!AppError::StorageConflict("dup".into()).is_fatal());
    }

    #[test]
    fn test_codes() {
        assert_eq!(AppError::MalformedRow("x".into()).code(), ErrorCode::MalformedRow);
        assert_eq!(
            AppError::from(config::ConfigError::Message("bad".into())).code(),
            ErrorCode::Failure
        );
        assert_eq!(
            AppError::Database(sqlx::Error::PoolTimedOut).code(),
            ErrorCode::ConnectionLost
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).into_transaction_failure().code(),
            ErrorCode::TransactionFailure
        );
    }
}
