//! API error types.

use axum::http::StatusCode;
use thiserror::Error;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// API error enum covering all error cases.
///
/// Rows hidden by row-level security surface as `NotFound` or `Forbidden`,
/// never as a distinct isolation error.
#[derive(Debug, Error)]
pub enum ApiError {
    // 400 Bad Request
    #[error("Bad request: {0}")]
    BadRequest(String),

    // 401 Unauthorized
    #[error("Authentication required")]
    Unauthorized,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    // 403 Forbidden
    #[error("Access denied")]
    Forbidden,

    #[error("This endpoint requires a tenant context")]
    TenantRequired,

    #[error("Access session is not active")]
    AccessSessionInactive,

    // 404 Not Found
    #[error("{0} not found")]
    NotFound(String),

    // 409 Conflict
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    // 500 Internal Server Error
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),

    #[error("Database error")]
    Database(#[source] sqlx::Error),

    #[error("Audit trail unavailable")]
    Audit(#[source] citadel_audit::AuditError),

    // 503 Service Unavailable
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl ApiError {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,

            Self::Unauthorized | Self::TokenExpired | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }

            Self::Forbidden | Self::TenantRequired | Self::AccessSessionInactive => {
                StatusCode::FORBIDDEN
            }

            Self::NotFound(_) => StatusCode::NOT_FOUND,

            Self::DuplicateEntry(_) => StatusCode::CONFLICT,

            Self::Internal(_) | Self::Database(_) | Self::Audit(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get error code for client handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::TokenExpired => "token_expired",
            Self::InvalidToken => "invalid_token",
            Self::Forbidden => "forbidden",
            Self::TenantRequired => "tenant_required",
            Self::AccessSessionInactive => "access_session_inactive",
            Self::NotFound(_) => "not_found",
            Self::DuplicateEntry(_) => "duplicate_entry",
            Self::Internal(_) => "internal_error",
            Self::Database(_) => "database_error",
            Self::Audit(_) => "audit_error",
            Self::ServiceUnavailable => "service_unavailable",
        }
    }

    /// Check if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}
