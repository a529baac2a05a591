//! Append-only access session store.

use crate::error::{AuditError, AuditResult};
use crate::model::{AccessMutation, AccessSession, EndOutcome, MutationRow, NewMutation, SessionRow};
use crate::token::{hash_token, SessionToken};
use citadel_common_core::{AccessSessionId, MutationLogId, TenantId, UserId};
use sqlx::PgPool;
use tracing::{error, info};

const SESSION_COLUMNS: &str = "id, admin_user_id, tenant_id, started_at, ended_at, token_hash";
const MUTATION_COLUMNS: &str = "id, session_id, method, path, status_code, occurred_at";

/// Access session persistence on the elevated pool.
///
/// The pool must not be the tenant-scoped application pool: these rows have
/// to outlive any tenant or user they reference.
#[derive(Clone)]
pub struct AccessSessionStore {
    pool: PgPool,
}

impl AccessSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Begin a session. The raw token is returned once and never stored.
    pub async fn start(
        &self,
        admin_user_id: UserId,
        tenant_id: TenantId,
    ) -> AuditResult<(AccessSession, SessionToken)> {
        let token = SessionToken::generate();
        let id = AccessSessionId::new();

        let row: SessionRow = sqlx::query_as(&format!(
            "INSERT INTO access_sessions (id, admin_user_id, tenant_id, token_hash) \
             VALUES ($1, $2, $3, $4) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(admin_user_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(token.hash())
        .fetch_one(&self.pool)
        .await
        .map_err(AuditError::write("access session"))?;

        info!(
            event = "access_session_started",
            session_id = %id,
            admin_user_id = %admin_user_id,
            tenant_id = %tenant_id,
            "Access session started"
        );
        Ok((row.into(), token))
    }

    /// End a session. Ending one that already ended changes nothing.
    pub async fn end(&self, id: AccessSessionId) -> AuditResult<EndOutcome> {
        let ended: Option<SessionRow> = sqlx::query_as(&format!(
            "UPDATE access_sessions SET ended_at = now() \
             WHERE id = $1 AND ended_at IS NULL RETURNING {SESSION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(AuditError::write("access session end"))?;

        if let Some(row) = ended {
            info!(event = "access_session_ended", session_id = %id, "Access session ended");
            return Ok(EndOutcome::Ended(row.into()));
        }

        match self.get(id).await? {
            Some(session) => Ok(EndOutcome::AlreadyEnded(session)),
            None => Err(AuditError::SessionNotFound(id)),
        }
    }

    pub async fn get(&self, id: AccessSessionId) -> AuditResult<Option<AccessSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM access_sessions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Resolve a presented raw token to its session, if still active.
    pub async fn find_active(&self, raw_token: &str) -> AuditResult<Option<AccessSession>> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM access_sessions \
             WHERE token_hash = $1 AND ended_at IS NULL"
        ))
        .bind(hash_token(raw_token))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Append a mutation record. Failures are returned, never swallowed; the
    /// caller must fail the action it was recording.
    ///
    /// Only an active session accepts records. A session ended while the
    /// request was in flight yields [`AuditError::SessionEnded`].
    pub async fn append_mutation(
        &self,
        session_id: AccessSessionId,
        mutation: NewMutation,
    ) -> AuditResult<AccessMutation> {
        let id = MutationLogId::new();
        let status = i16::try_from(mutation.status_code).unwrap_or(i16::MAX);

        let row: Option<MutationRow> = sqlx::query_as(&format!(
            "INSERT INTO access_mutation_logs (id, session_id, method, path, status_code) \
             SELECT $1, s.id, $3, $4, $5 FROM access_sessions s \
             WHERE s.id = $2 AND s.ended_at IS NULL \
             RETURNING {MUTATION_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(session_id.as_uuid())
        .bind(&mutation.method)
        .bind(&mutation.path)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                session_id = %session_id,
                method = %mutation.method,
                path = %mutation.path,
                error = %e,
                "Failed to append access mutation"
            );
            AuditError::Write {
                what: "access mutation",
                source: e,
            }
        })?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                let err = match self.get(session_id).await? {
                    Some(_) => AuditError::SessionEnded(session_id),
                    None => AuditError::SessionNotFound(session_id),
                };
                error!(
                    session_id = %session_id,
                    method = %mutation.method,
                    path = %mutation.path,
                    error = %err,
                    "Refused access mutation"
                );
                Err(err)
            }
        }
    }

    pub async fn mutations(&self, session_id: AccessSessionId) -> AuditResult<Vec<AccessMutation>> {
        let rows: Vec<MutationRow> = sqlx::query_as(&format!(
            "SELECT {MUTATION_COLUMNS} FROM access_mutation_logs \
             WHERE session_id = $1 ORDER BY occurred_at, id"
        ))
        .bind(session_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
