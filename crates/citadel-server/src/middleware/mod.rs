//! Middleware for the Citadel API server.
//!
//! Request order, outermost first: authentication, access-session
//! resolution, the tenant guard, the tenant scope, mutation recording, then
//! the handler.

pub mod access_session;
pub mod auth;
pub mod tenant_scope;

pub use access_session::{
    record_mutation, resolve_access_session, ActiveAccessSession, ACCESS_SESSION_HEADER,
};
pub use auth::{require_tenant, AdminAuth, Auth, AuthLayer, AuthMiddleware};
pub use tenant_scope::{ScopeOutcome, TenantScopeLayer, TenantScopeMiddleware, TenantTx};
