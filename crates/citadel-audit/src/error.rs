//! Audit errors.

use citadel_common_core::AccessSessionId;
use thiserror::Error;

pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("access session {0} not found")]
    SessionNotFound(AccessSessionId),

    #[error("access session {0} has ended")]
    SessionEnded(AccessSessionId),

    #[error("failed to record {what}: {source}")]
    Write {
        what: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("audit database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AuditError {
    pub(crate) fn write(what: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Write { what, source }
    }
}
