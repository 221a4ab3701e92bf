//! Error types for FFLO server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ledger::LedgerViolation;

/// Application error codes reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchData = 4,
    BadValue = 5,
    Duplicate = 6,
    NoAvailableCopies = 7,
    HoldExists = 8,
    QuotaExceeded = 9,
    OutstandingRental = 10,
    NoOutstandingRental = 11,
    NoMembership = 12,
    PaymentFailure = 13,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error(transparent)]
    Ledger(#[from] LedgerViolation),
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub detail: String,
}

impl AppError {
    fn parts(&self) -> (StatusCode, ErrorCode, String) {
        match self {
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchData, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorCode::Duplicate, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
            AppError::PaymentProvider(msg) => {
                tracing::error!("Payment provider error: {}", msg);
                (StatusCode::BAD_GATEWAY, ErrorCode::PaymentFailure, msg.clone())
            }
            AppError::Ledger(violation) => {
                let (status, code) = match violation {
                    LedgerViolation::NoAvailableCopies => {
                        (StatusCode::BAD_REQUEST, ErrorCode::NoAvailableCopies)
                    }
                    LedgerViolation::HoldAlreadyExists => {
                        (StatusCode::BAD_REQUEST, ErrorCode::HoldExists)
                    }
                    LedgerViolation::NoActiveMembership => {
                        (StatusCode::FORBIDDEN, ErrorCode::NoMembership)
                    }
                    LedgerViolation::QuotaExhausted { .. } => {
                        (StatusCode::FORBIDDEN, ErrorCode::QuotaExceeded)
                    }
                    LedgerViolation::OutstandingRental => {
                        (StatusCode::BAD_REQUEST, ErrorCode::OutstandingRental)
                    }
                    LedgerViolation::NoOutstandingRental => {
                        (StatusCode::BAD_REQUEST, ErrorCode::NoOutstandingRental)
                    }
                    LedgerViolation::InvalidTransition { .. } => {
                        (StatusCode::BAD_REQUEST, ErrorCode::BadValue)
                    }
                };
                (status, code, violation.to_string())
            }
        }
    }

    /// HTTP status this error is reported with
    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, detail) = self.parts();

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            detail,
        });

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{}: {}", field, msg),
                    None => format!("{}: invalid value", field),
                })
            })
            .collect();
        messages.sort();
        AppError::Validation(messages.join("; "))
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_violation_status() {
        assert_eq!(
            AppError::from(LedgerViolation::NoAvailableCopies).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(LedgerViolation::QuotaExhausted { used: 4, quota: 4 }).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(LedgerViolation::HoldAlreadyExists).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(LedgerViolation::NoOutstandingRental).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let (status, code, detail) = AppError::Internal("disk on fire".to_string()).parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, ErrorCode::Failure);
        assert_eq!(detail, "Internal server error");
    }
}
