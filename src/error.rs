use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Payment provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Ledger-level errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Insufficient funds on account {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: Uuid,
        required: i64,
        available: i64,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),
}

/// Settlement state machine errors
#[derive(Error, Debug)]
pub enum SettlementError {
    /// A status guard rejected a mutation. Inside batch jobs this is a
    /// benign race (another invocation got there first) and is counted as
    /// skipped, never surfaced as a failure.
    #[error("Invalid state transition for {entity} {id}: current {current}, expected {expected}")]
    InvalidStateTransition {
        entity: &'static str,
        id: Uuid,
        current: String,
        expected: String,
    },

    #[error("Order {0} has an unresolved dispute")]
    DisputeOpen(Uuid),

    #[error("Content already unlocked for this buyer")]
    AlreadyUnlocked,

    /// A compensating write failed after a forward step had committed. The
    /// ledger no longer nets to zero for the attempt; reconciliation is
    /// manual.
    #[error("Rollback failed for {reference} {id}: {message}")]
    RollbackFailed {
        reference: &'static str,
        id: Uuid,
        message: String,
    },
}

/// Payment provider call failures
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Transfer rejected ({code}): {message}")]
    Transfer { code: String, message: String },

    #[error("Balance unavailable: {0}")]
    BalanceUnavailable(String),

    #[error("Provider request failed: {0}")]
    Request(String),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::Ledger(LedgerError::InsufficientFunds {
                account,
                required,
                available,
            }) => (
                StatusCode::CONFLICT,
                "INSUFFICIENT_FUNDS",
                "Insufficient XP balance".to_string(),
                Some(serde_json::json!({
                    "account": account,
                    "required": required,
                    "available": available,
                })),
            ),
            AppError::Ledger(LedgerError::AccountNotFound(id)) => (
                StatusCode::NOT_FOUND,
                "ACCOUNT_NOT_FOUND",
                format!("Account not found: {}", id),
                None,
            ),
            AppError::Settlement(SettlementError::InvalidStateTransition {
                entity,
                id,
                current,
                expected,
            }) => (
                StatusCode::CONFLICT,
                "INVALID_STATE_TRANSITION",
                format!("{} {} is {}, expected {}", entity, id, current, expected),
                None,
            ),
            AppError::Settlement(SettlementError::DisputeOpen(order_id)) => (
                StatusCode::CONFLICT,
                "DISPUTE_OPEN",
                format!("Order {} is blocked by an unresolved dispute", order_id),
                None,
            ),
            AppError::Settlement(SettlementError::AlreadyUnlocked) => (
                StatusCode::CONFLICT,
                "ALREADY_UNLOCKED",
                "Content already unlocked for this buyer".to_string(),
                None,
            ),
            AppError::Settlement(SettlementError::RollbackFailed { .. }) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ROLLBACK_FAILED",
                "Transfer could not be completed".to_string(),
                None,
            ),
            AppError::Provider(e) => (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                format!("Payment provider error: {}", e),
                None,
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Unauthorized".to_string(),
                None,
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                None,
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::Provider(ProviderError::Request(format!("{:?}", error)))
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_message() {
        let err = LedgerError::InsufficientFunds {
            account: Uuid::nil(),
            required: 500,
            available: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("required 500"));
        assert!(msg.contains("available 100"));
    }

    #[test]
    fn test_state_transition_error_is_distinguishable() {
        let err = AppError::Settlement(SettlementError::InvalidStateTransition {
            entity: "order",
            id: Uuid::nil(),
            current: "completed".to_string(),
            expected: "escrow".to_string(),
        });
        assert!(matches!(
            err,
            AppError::Settlement(SettlementError::InvalidStateTransition { .. })
        ));
    }
}
