//! Authentication extractors and the tenant guard.

use crate::error::ApiError;
use axum::{
    async_trait,
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use citadel_common_core::Principal;

/// Extractor for the authenticated principal (required).
pub struct Auth(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(Auth)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Extractor that requires a platform administrator.
pub struct AdminAuth(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(ApiError::Unauthorized)?;

        if principal.is_platform_admin() {
            Ok(AdminAuth(principal))
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// Route guard for tenant-scoped routes.
///
/// Rejects tenant-less principals before any transaction is opened. Platform
/// administrators pass through without a tenant; the database exception
/// policies decide what they may touch.
pub async fn require_tenant(req: Request<Body>, next: Next) -> Response {
    match check_tenant(req.extensions().get::<Principal>()) {
        Ok(()) => next.run(req).await,
        Err(err) => err.into_response(),
    }
}

fn check_tenant(principal: Option<&Principal>) -> Result<(), ApiError> {
    let principal = principal.ok_or(ApiError::Unauthorized)?;
    if principal.tenant_id.is_some() || principal.is_platform_admin() {
        Ok(())
    } else {
        Err(ApiError::TenantRequired)
    }
}
