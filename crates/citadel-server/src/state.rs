//! Shared application state.

use crate::config::ServerConfig;
use crate::db::{self, PoolKind, TenantScope};
use anyhow::{Context, Result};
use citadel_audit::AccessSessionStore;
use sqlx::PgPool;
use std::sync::Arc;

/// State handed to every router.
#[derive(Clone)]
pub struct AppState {
    /// Application login; only ever used through a tenant scope.
    pub pool: PgPool,
    /// Elevated login for provisioning and the audit trail.
    pub admin_pool: PgPool,
    pub audit: AccessSessionStore,
    pub scope: TenantScope,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Connect both pools.
    pub async fn new(config: &ServerConfig) -> Result<Self> {
        let pool = db::create_pool(&config.database, PoolKind::Application).await?;
        let admin_pool = db::create_pool(&config.database, PoolKind::Admin).await?;
        Self::from_pools(config.clone(), pool, admin_pool)
    }

    /// Build around existing pools.
    pub fn from_pools(config: ServerConfig, pool: PgPool, admin_pool: PgPool) -> Result<Self> {
        let scope = TenantScope::from_config(&config.database)
            .context("Invalid tenant scope configuration")?;
        Ok(Self {
            audit: AccessSessionStore::new(admin_pool.clone()),
            pool,
            admin_pool,
            scope,
            config: Arc::new(config),
        })
    }
}
