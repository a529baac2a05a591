//! Audit entities.

use chrono::{DateTime, Utc};
use citadel_common_core::{AccessSessionId, MutationLogId, TenantId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One elevated session of a platform operator inside a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSession {
    pub id: AccessSessionId,
    pub admin_user_id: UserId,
    pub tenant_id: TenantId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing, default)]
    pub token_hash: String,
}

impl AccessSession {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// A mutating request made during an access session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMutation {
    pub id: MutationLogId,
    pub session_id: AccessSessionId,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub occurred_at: DateTime<Utc>,
}

/// Input for appending a mutation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMutation {
    pub method: String,
    pub path: String,
    pub status_code: u16,
}

impl NewMutation {
    pub fn new(method: impl Into<String>, path: impl Into<String>, status_code: u16) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            status_code,
        }
    }
}

/// Methods that change state and therefore get logged.
pub fn is_mutating(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "POST" | "PUT" | "PATCH" | "DELETE"
    )
}

/// Result of ending a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOutcome {
    Ended(AccessSession),
    /// The session had already ended; nothing changed.
    AlreadyEnded(AccessSession),
}

impl EndOutcome {
    pub fn session(&self) -> &AccessSession {
        match self {
            Self::Ended(s) | Self::AlreadyEnded(s) => s,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SessionRow {
    pub id: Uuid,
    pub admin_user_id: Uuid,
    pub tenant_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub token_hash: String,
}

impl From<SessionRow> for AccessSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id.into(),
            admin_user_id: row.admin_user_id.into(),
            tenant_id: row.tenant_id.into(),
            started_at: row.started_at,
            ended_at: row.ended_at,
            token_hash: row.token_hash,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MutationRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub method: String,
    pub path: String,
    pub status_code: i16,
    pub occurred_at: DateTime<Utc>,
}

impl From<MutationRow> for AccessMutation {
    fn from(row: MutationRow) -> Self {
        Self {
            id: row.id.into(),
            session_id: row.session_id.into(),
            method: row.method,
            path: row.path,
            status_code: u16::try_from(row.status_code).unwrap_or_default(),
            occurred_at: row.occurred_at,
        }
    }
}
