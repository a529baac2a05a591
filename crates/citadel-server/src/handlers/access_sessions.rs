//! Access session endpoints. Platform administrators only.

use crate::error::{ApiError, ApiResult};
use crate::middleware::AdminAuth;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use citadel_audit::{AccessMutation, AccessSession, EndOutcome};
use citadel_common_core::{AccessSessionId, TenantId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct StartSession {
    pub tenant_id: String,
}

#[derive(Debug, Serialize)]
pub struct StartedSession {
    pub session: AccessSession,
    /// Shown once; only its digest is stored.
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct EndedSession {
    pub session: AccessSession,
    pub already_ended: bool,
}

pub async fn start_session(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    Json(body): Json<StartSession>,
) -> ApiResult<(StatusCode, Json<StartedSession>)> {
    let tenant_id = TenantId::parse(&body.tenant_id)
        .map_err(|_| ApiError::BadRequest("tenant_id is not a valid id".into()))?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tenants WHERE id = $1)")
        .bind(tenant_id.as_uuid())
        .fetch_one(&state.admin_pool)
        .await?;
    if !exists {
        return Err(ApiError::NotFound("Tenant".into()));
    }

    let (session, token) = state.audit.start(admin.user_id, tenant_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(StartedSession {
            session,
            token: token.into_raw(),
        }),
    ))
}

pub async fn end_session(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
    Path(id): Path<String>,
) -> ApiResult<Json<EndedSession>> {
    let id = parse_session_id(&id)?;
    let outcome = state.audit.end(id).await?;
    let already_ended = matches!(outcome, EndOutcome::AlreadyEnded(_));
    let session = match outcome {
        EndOutcome::Ended(s) | EndOutcome::AlreadyEnded(s) => s,
    };
    Ok(Json(EndedSession {
        session,
        already_ended,
    }))
}

pub async fn list_mutations(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<AccessMutation>>> {
    let id = parse_session_id(&id)?;
    if state.audit.get(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Access session {id}")));
    }
    Ok(Json(state.audit.mutations(id).await?))
}

fn parse_session_id(raw: &str) -> ApiResult<AccessSessionId> {
    AccessSessionId::parse(raw).map_err(|_| ApiError::BadRequest("invalid access session id".into()))
}
