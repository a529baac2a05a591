//! Error response implementation.

use super::types::ApiError;
use axum::{
    response::{IntoResponse, Response},
    Json,
};
use citadel_audit::AuditError;
use serde::Serialize;
use tracing::{error, warn};

/// Unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";
/// Raised when a write fails a row-level security `WITH CHECK`.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            error!(
                error = %self,
                source = ?std::error::Error::source(&self).map(|s| s.to_string()),
                code = self.error_code(),
                "Server error occurred"
            );
        } else if matches!(
            self,
            ApiError::Unauthorized | ApiError::Forbidden | ApiError::TenantRequired
        ) {
            warn!(error = %self, code = self.error_code(), "Auth error occurred");
        }

        let status = self.status_code();
        let code = self.error_code();

        let message = match &self {
            ApiError::Internal(err) => {
                if cfg!(debug_assertions) {
                    format!("{}: {}", self, err)
                } else {
                    "An internal error occurred".to_string()
                }
            }
            ApiError::Database(err) => {
                if cfg!(debug_assertions) {
                    format!("Database error: {}", err)
                } else {
                    "A database error occurred".to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Record".into()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => ApiError::DuplicateEntry(db_err.message().to_string()),
                Some(INSUFFICIENT_PRIVILEGE) => ApiError::Forbidden,
                _ => ApiError::Database(err),
            },
            sqlx::Error::PoolTimedOut => ApiError::ServiceUnavailable,
            _ => ApiError::Database(err),
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::SessionNotFound(id) => ApiError::NotFound(format!("Access session {id}")),
            AuditError::SessionEnded(_) => ApiError::AccessSessionInactive,
            other => ApiError::Audit(other),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::TokenExpired,
            _ => ApiError::InvalidToken,
        }
    }
}
