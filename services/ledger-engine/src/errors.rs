use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::ApiResponse;

pub type Result<T> = std::result::Result<T, LedgerError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Faults raised by an account or transaction log store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Timed out waiting for lock on account {0}")]
    LockTimeout(i64),

    #[error("Deadlock detected: {0}")]
    Deadlock(String),

    #[error("Account {0} disappeared while locked")]
    RowVanished(i64),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Injected fault: {0}")]
    Injected(&'static str),
}

impl StoreError {
    /// Classifies a driver error, separating lock waits and deadlocks
    /// from the remaining database faults.
    pub fn from_sqlx(err: sqlx::Error, account_id: i64) -> Self {
        let code = match &err {
            sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
            _ => None,
        };

        match code.as_deref() {
            Some("55P03") => StoreError::LockTimeout(account_id),
            Some("40P01") => StoreError::Deadlock(err.to_string()),
            Some("23503") | Some("23514") => StoreError::Constraint(err.to_string()),
            _ => StoreError::Database(err),
        }
    }

    /// Lock waits and deadlocks leave nothing behind after rollback.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::LockTimeout(_) | StoreError::Deadlock(_))
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("Operation failed: {0}")]
    OperationFailed(#[from] StoreError),
}

impl LedgerError {
    pub fn error_type(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation_error",
            LedgerError::AccountNotFound(_) => "not_found",
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::OperationFailed(_) => "operation_failed",
        }
    }

    /// Message safe to hand back to callers. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            LedgerError::Validation(msg) => msg.clone(),
            LedgerError::AccountNotFound(_) => "Account not found".to_string(),
            LedgerError::InsufficientFunds { .. } => "Insufficient funds".to_string(),
            LedgerError::OperationFailed(_) => "Internal server error".to_string(),
        }
    }
}

impl ResponseError for LedgerError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        HttpResponse::build(status_code).json(ApiResponse::<()>::error(
            status_code.as_u16(),
            self.public_message(),
        ))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            LedgerError::OperationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            LedgerError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(LedgerError::AccountNotFound(7).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            LedgerError::InsufficientFunds {
                required: dec!(1500),
                available: dec!(1000),
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            LedgerError::OperationFailed(StoreError::LockTimeout(1)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_storage_details_are_not_exposed() {
        let err = LedgerError::OperationFailed(StoreError::Deadlock(
            "process 42 waits for ShareLock".to_string(),
        ));
        assert!(err.to_string().contains("ShareLock"));
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_retryable_faults() {
        assert!(StoreError::LockTimeout(1).is_retryable());
        assert!(StoreError::Deadlock("x".into()).is_retryable());
        assert!(!StoreError::RowVanished(1).is_retryable());
        assert!(!StoreError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }
}
