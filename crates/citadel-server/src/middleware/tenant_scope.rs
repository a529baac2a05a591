//! Transactional scope middleware.
//!
//! Every request behind [`TenantScopeLayer`] runs inside exactly one
//! transaction. The tenant of the authenticated principal is bound into that
//! transaction before the handler runs, and the transaction ends with the
//! request: committed for a success status, rolled back otherwise. Handlers
//! reach it through the [`TenantTx`] extractor and never open their own.

use crate::db::TenantScope;
use crate::error::{ApiError, ApiResult};
use anyhow::anyhow;
use axum::{
    async_trait,
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, Request, StatusCode},
    response::{IntoResponse, Response},
};
use citadel_common_core::{Principal, TenantId};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tower::{Layer, Service};
use tracing::{debug, error, warn};

/// How a request's transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOutcome {
    Commit,
    Rollback,
}

impl ScopeOutcome {
    /// Error statuses (4xx and 5xx) roll back; everything else commits.
    pub fn for_status(status: StatusCode) -> Self {
        if status.is_client_error() || status.is_server_error() {
            Self::Rollback
        } else {
            Self::Commit
        }
    }
}

/// The request's transaction.
///
/// Cloning shares the same transaction. Dropping the last clone without
/// finishing it rolls back and returns the connection to the pool, which is
/// what happens when a request is cancelled or its handler panics.
#[derive(Clone)]
pub struct TenantTx {
    slot: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
    tenant_id: Option<TenantId>,
}

impl TenantTx {
    fn new(tx: Transaction<'static, Postgres>, tenant_id: Option<TenantId>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(tx))),
            tenant_id,
        }
    }

    /// Tenant bound to the transaction, if any.
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    /// Exclusive access to the transaction's connection.
    pub async fn conn(&self) -> ApiResult<MappedMutexGuard<'_, PgConnection>> {
        let guard = self.slot.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_deref_mut())
            .map_err(|_| ApiError::Internal(anyhow!("request transaction already finished")))
    }

    async fn finish(&self, outcome: ScopeOutcome) -> Result<(), sqlx::Error> {
        let Some(tx) = self.slot.lock().await.take() else {
            return Ok(());
        };
        match outcome {
            ScopeOutcome::Commit => tx.commit().await,
            ScopeOutcome::Rollback => {
                // The connection is released whether or not this succeeds.
                if let Err(e) = tx.rollback().await {
                    warn!(error = %e, "Rollback failed");
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantTx
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantTx>()
            .cloned()
            .ok_or_else(|| ApiError::Internal(anyhow!("route is not behind the tenant scope")))
    }
}

/// Opens and binds the request transaction.
#[derive(Clone)]
pub struct TenantScopeLayer {
    pool: PgPool,
    scope: Arc<TenantScope>,
}

impl TenantScopeLayer {
    pub fn new(pool: PgPool, scope: TenantScope) -> Self {
        Self {
            pool,
            scope: Arc::new(scope),
        }
    }
}

impl<S> Layer<S> for TenantScopeLayer {
    type Service = TenantScopeMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TenantScopeMiddleware {
            inner,
            pool: self.pool.clone(),
            scope: self.scope.clone(),
        }
    }
}

/// Transactional scope middleware service.
#[derive(Clone)]
pub struct TenantScopeMiddleware<S> {
    inner: S,
    pool: PgPool,
    scope: Arc<TenantScope>,
}

impl<S> Service<Request<Body>> for TenantScopeMiddleware<S>
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
        let pool = self.pool.clone();
        let scope = self.scope.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            // The principal is trusted as produced by authentication.
            let tenant = req
                .extensions()
                .get::<Principal>()
                .and_then(|p| p.tenant_id);

            let tx = match scope.begin(&pool, tenant).await {
                Ok(tx) => tx,
                Err(e) => {
                    error!(error = %e, "Failed to open tenant-scoped transaction");
                    return Ok(ApiError::from(e).into_response());
                }
            };

            let handle = TenantTx::new(tx, tenant);
            req.extensions_mut().insert(handle.clone());

            let result = inner.call(req).await;

            let outcome = match &result {
                Ok(response) => ScopeOutcome::for_status(response.status()),
                Err(_) => ScopeOutcome::Rollback,
            };
            debug!(
                tenant_id = ?tenant.map(|t| t.to_string()),
                ?outcome,
                "Finishing request transaction"
            );

            match handle.finish(outcome).await {
                Ok(()) => result,
                Err(e) => {
                    error!(error = %e, "Commit failed");
                    Ok(ApiError::from(e).into_response())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_statuses_commit() {
        for status in [StatusCode::OK, StatusCode::CREATED, StatusCode::NO_CONTENT] {
            assert_eq!(ScopeOutcome::for_status(status), ScopeOutcome::Commit);
        }
        assert_eq!(ScopeOutcome::for_status(StatusCode::SEE_OTHER), ScopeOutcome::Commit);
    }

    #[test]
    fn test_error_statuses_roll_back() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
            StatusCode::CONFLICT,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert_eq!(ScopeOutcome::for_status(status), ScopeOutcome::Rollback, "{status}");
        }
    }

    #[test]
    fn test_extractor_outside_scope_is_internal_error() {
        let (mut parts, _) = Request::new(()).into_parts();
        let result = tokio_test::block_on(TenantTx::from_request_parts(&mut parts, &()));
        assert!(matches!(result, Err(ApiError::Internal(_))));
    }
}
