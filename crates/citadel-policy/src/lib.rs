//! Row-level security for Citadel.
//!
//! The [`catalog`] lists every table and how it is isolated. [`plan`] turns
//! the catalog into concrete policy definitions, [`ddl`] renders them with
//! identifier validation at every interpolation, and [`provision`] applies
//! them idempotently through an elevated connection. [`render`] emits the
//! same objects as a migration script.

pub mod catalog;
pub mod cli;
pub mod ddl;
pub mod ident;
pub mod plan;
pub mod provision;
pub mod render;
pub mod seed;

pub use catalog::{
    CatalogError, ExceptionCommand, ExceptionPolicy, IsolationKind, PolicyCatalog, PolicyEntry,
};
pub use ddl::{PolicyDef, PolicyGroup, PolicyScope, TenantContext};
pub use ident::IdentError;
pub use plan::PolicyPlan;
pub use provision::{
    provision_on_startup, PolicyProvisioner, ProvisionError, ProvisionOptions, ProvisionReport,
    VectorOptions,
};
pub use render::render_script;
