//! `/api/v1` routes.

use crate::handlers::{access_sessions, assets, workflow_templates};
use crate::middleware::{
    record_mutation, require_tenant, resolve_access_session, AuthLayer, TenantScopeLayer,
};
use crate::state::AppState;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};

pub fn router(state: AppState) -> Router<AppState> {
    // Layers run bottom-up: the guard rejects before a transaction opens, and
    // the recorder sits inside the transaction so its failure rolls it back.
    let tenant_scoped = Router::new()
        .route("/assets", get(assets::list_assets).post(assets::create_asset))
        .route("/assets/:id", get(assets::get_asset))
        .route(
            "/workflow-templates",
            get(workflow_templates::list_workflow_templates),
        )
        .layer(from_fn_with_state(state.audit.clone(), record_mutation))
        .layer(TenantScopeLayer::new(state.pool.clone(), state.scope.clone()))
        .layer(from_fn(require_tenant));

    let access_sessions = Router::new()
        .route("/access-sessions", post(access_sessions::start_session))
        .route("/access-sessions/:id/end", post(access_sessions::end_session))
        .route(
            "/access-sessions/:id/mutations",
            get(access_sessions::list_mutations),
        );

    Router::new()
        .merge(tenant_scoped)
        .merge(access_sessions)
        .layer(from_fn_with_state(state.audit.clone(), resolve_access_session))
        .layer(AuthLayer::new(state.config.auth.jwt_secret.clone()))
}
