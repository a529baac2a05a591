//! Internal routes for health checks.

use crate::db::check_health;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::time::Duration;

const READINESS_TIMEOUT: Duration = Duration::from_secs(2);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(liveness))
        .route("/health/ready", get(readiness))
}

async fn liveness() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let database = check_health(&state.pool, READINESS_TIMEOUT).await;
    let status = if database.is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database.is_healthy { "ready" } else { "unavailable" },
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "checks": { "database": database }
        })),
    )
}
