//! Route configuration for the Citadel API server.

mod internal;
mod v1;

use crate::error::ApiError;
use crate::state::AppState;
use axum::{response::IntoResponse, Router};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;

    // A timed-out or panicking request drops its transaction, which rolls back.
    let common_middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(RequestBodyLimitLayer::new(server.body_limit_bytes))
        // Innermost: `Timeout` needs a response body with `Default`.
        .layer(TimeoutLayer::new(server.request_timeout()));

    Router::new()
        .nest("/api/v1", v1::router(state.clone()))
        .nest("/internal", internal::router())
        .fallback(fallback_handler)
        .layer(common_middleware)
        .with_state(state)
}

async fn fallback_handler() -> impl IntoResponse {
    ApiError::NotFound("Route".into())
}
