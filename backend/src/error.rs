//! Error handling for the PharmaFlow sales core
//!
//! Every failure carries a stable [`ErrorCode`] and a retry classification;
//! mapping to transport codes is left to the caller.

use pharmaflow_shared::{ErrorCode, SaleOutcome};
use thiserror::Error;

/// Postgres SQLSTATE raised when `lock_timeout` elapses
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Sales core error types
#[derive(Error, Debug)]
pub enum SaleError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business rule errors
    #[error("Insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i32, available: i32 },

    #[error("Lot {lot_id} was modified by another transaction (expected version {expected})")]
    VersionConflict { lot_id: i64, expected: i64 },

    #[error("Timed out waiting for the lock on lot {lot_id}")]
    LockTimeout { lot_id: i64 },

    // Caller errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    // Store errors
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SaleError {
    /// Stable code reported to callers
    pub fn code(&self) -> ErrorCode {
        match self {
            SaleError::NotFound(_) => ErrorCode::NotFound,
            SaleError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            SaleError::VersionConflict { .. } => ErrorCode::VersionConflict,
            SaleError::LockTimeout { .. } => ErrorCode::LockTimeout,
            SaleError::Validation { .. } => ErrorCode::ValidationError,
            SaleError::InsufficientPermissions(_) => ErrorCode::InsufficientPermissions,
            SaleError::Connection(_) => ErrorCode::ConnectionError,
            SaleError::Database(_) | SaleError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether the same request may succeed if tried again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SaleError::VersionConflict { .. }
                | SaleError::LockTimeout { .. }
                | SaleError::Connection(_)
        )
    }

    /// Map a database error raised while waiting for a row lock
    pub fn from_lock_wait(err: sqlx::Error, lot_id: i64) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE) {
                return SaleError::LockTimeout { lot_id };
            }
        }
        err.into()
    }
}

impl From<sqlx::Error> for SaleError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => SaleError::Connection(err.to_string()),
            sqlx::Error::RowNotFound => SaleError::NotFound("Row".to_string()),
            other => SaleError::Database(other),
        }
    }
}

impl From<SaleError> for SaleOutcome {
    fn from(err: SaleError) -> Self {
        SaleOutcome::failed(err.code(), err.to_string())
    }
}

/// Result type alias for the sales core
pub type SaleResult<T> = Result<T, SaleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(SaleError::VersionConflict { lot_id: 1, expected: 2 }.is_retryable());
        assert!(SaleError::LockTimeout { lot_id: 1 }.is_retryable());
        assert!(SaleError::Connection("down".into()).is_retryable());
        assert!(!SaleError::NotFound("Lot 1".into()).is_retryable());
        assert!(!SaleError::InsufficientStock { requested: 3, available: 1 }.is_retryable());
    }

    #[test]
    fn test_pool_errors_are_connection_errors() {
        let err: SaleError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.code(), ErrorCode::ConnectionError);

        let err: SaleError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_outcome_from_error() {
        let outcome: SaleOutcome = SaleError::InsufficientStock {
            requested: 10,
            available: 5,
        }
        .into();
        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(ErrorCode::InsufficientStock));
        assert!(outcome.sale_id.is_none());
        assert!(outcome.message.contains("requested 10"));
    }

    #[test]
    fn test_logged_code_matches_wire_code() {
        let err = SaleError::LockTimeout { lot_id: 4 };
        let wire = serde_json::to_value(err.code()).unwrap();
        assert_eq!(wire, err.code().to_string());
        assert_eq!(err.code().to_string(), "LOCK_TIMEOUT");
    }
}
