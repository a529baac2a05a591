//! Database connection management and tenant scoping.

pub mod health;
pub mod migration;
pub mod pool;
pub mod scope;

pub use health::{check_health, DbHealth};
pub use migration::run_migrations;
pub use pool::{create_pool, pool_stats, verify_connection, PoolKind, PoolStats};
pub use scope::{with_tenant_scope, TenantScope};
