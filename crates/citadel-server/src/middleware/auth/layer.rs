//! Authentication middleware layer.

use super::{jwt::decode_token, types::TokenType};
use crate::error::ApiError;
use axum::{
    body::Body,
    http::{header, Request},
    response::{IntoResponse, Response},
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::debug;

/// Verifies the bearer token and stores the resulting
/// [`Principal`](citadel_common_core::Principal) in request extensions.
#[derive(Clone)]
pub struct AuthLayer {
    jwt_secret: Arc<String>,
}

impl AuthLayer {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: Arc::new(jwt_secret.into()),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            jwt_secret: self.jwt_secret.clone(),
        }
    }
}

/// Authentication middleware service.
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    jwt_secret: Arc<String>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let jwt_secret = self.jwt_secret.clone();
        // Take the service that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let principal = match authenticate(&req, &jwt_secret) {
                Ok(principal) => principal,
                Err(err) => return Ok(err.into_response()),
            };

            debug!(
                user_id = %principal.user_id,
                tenant_id = ?principal.tenant_id.map(|t| t.to_string()),
                role = %principal.role,
                "Authenticated request"
            );
            req.extensions_mut().insert(principal);

            inner.call(req).await
        })
    }
}

fn authenticate(
    req: &Request<Body>,
    jwt_secret: &str,
) -> Result<citadel_common_core::Principal, ApiError> {
    let token = extract_token(req)?;
    let claims = decode_token(&token, jwt_secret)?;

    if claims.token_type != TokenType::Access {
        return Err(ApiError::InvalidToken);
    }
    if claims.is_expired() {
        return Err(ApiError::TokenExpired);
    }
    claims.principal().ok_or(ApiError::InvalidToken)
}

fn extract_token(req: &Request<Body>) -> Result<String, ApiError> {
    if let Some(auth_header) = req.headers().get(header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| ApiError::InvalidToken)?;

        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(token.to_string());
        }
    }

    if let Some(cookie_header) = req.headers().get(header::COOKIE) {
        let cookie_str = cookie_header.to_str().map_err(|_| ApiError::InvalidToken)?;

        for cookie in cookie_str.split(';') {
            if let Some(token) = cookie.trim().strip_prefix("access_token=") {
                return Ok(token.to_string());
            }
        }
    }

    Err(ApiError::Unauthorized)
}
