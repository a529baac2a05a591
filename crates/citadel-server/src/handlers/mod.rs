//! Request handlers.
//!
//! Tenant data is read and written only through [`TenantTx`]; no handler
//! filters by tenant itself.
//!
//! [`TenantTx`]: crate::middleware::TenantTx

pub mod access_sessions;
pub mod assets;
pub mod workflow_templates;
