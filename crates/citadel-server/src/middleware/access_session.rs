//! Elevated support sessions on the request path.
//!
//! A platform administrator acts inside a tenant by sending the raw session
//! token in `X-Access-Session`. [`resolve_access_session`] runs before the
//! tenant scope and swaps in a principal bound to the session's tenant.
//! [`record_mutation`] runs inside the tenant scope, after the handler, so a
//! failed audit append turns the response into an error and the request's
//! transaction rolls back with it.
//!
//! The record is written on the elevated pool before the tenant transaction
//! commits, and it carries the handler's status. If that commit then fails the
//! client sees an error while the log keeps the attempted mutation with the
//! handler's status. The log is a record of attempts, not of outcomes.

use crate::error::ApiError;
use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use citadel_audit::{model::is_mutating, AccessSession, AccessSessionStore, NewMutation};
use citadel_common_core::Principal;
use tracing::{info, warn};

pub const ACCESS_SESSION_HEADER: &str = "x-access-session";

/// The access session a request is running under.
#[derive(Debug, Clone)]
pub struct ActiveAccessSession(pub AccessSession);

/// Resolve `X-Access-Session` into a tenant-bound principal.
pub async fn resolve_access_session(
    State(store): State<AccessSessionStore>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(header) = req.headers().get(ACCESS_SESSION_HEADER) else {
        return next.run(req).await;
    };
    let token = match header.to_str() {
        Ok(token) => token.to_string(),
        Err(_) => return ApiError::AccessSessionInactive.into_response(),
    };

    let principal = match req.extensions().get::<Principal>() {
        Some(p) if p.is_platform_admin() => p.clone(),
        Some(_) => return ApiError::Forbidden.into_response(),
        None => return ApiError::Unauthorized.into_response(),
    };

    let session = match store.find_active(&token).await {
        Ok(Some(session)) if session.admin_user_id == principal.user_id => session,
        Ok(_) => {
            warn!(user_id = %principal.user_id, "Unknown, ended or foreign access session");
            return ApiError::AccessSessionInactive.into_response();
        }
        Err(e) => return ApiError::from(e).into_response(),
    };

    info!(
        session_id = %session.id,
        user_id = %principal.user_id,
        tenant_id = %session.tenant_id,
        "Request elevated into tenant"
    );
    req.extensions_mut()
        .insert(principal.assume_tenant(session.tenant_id));
    req.extensions_mut().insert(ActiveAccessSession(session));

    next.run(req).await
}

/// Append every mutating request made under an access session.
///
/// Runs before the tenant commit; the stored status is the handler's.
pub async fn record_mutation(
    State(store): State<AccessSessionStore>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let session = req.extensions().get::<ActiveAccessSession>().cloned();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    let Some(ActiveAccessSession(session)) = session else {
        return response;
    };
    if !is_mutating(method.as_str()) {
        return response;
    }

    let entry = NewMutation::new(method.as_str(), path, response.status().as_u16());
    match store.append_mutation(session.id, entry).await {
        Ok(_) => response,
        // Never let an elevated mutation through without its record.
        Err(e) => ApiError::from(e).into_response(),
    }
}
