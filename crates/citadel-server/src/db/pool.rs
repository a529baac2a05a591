//! Database pool management.

use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use tracing::info;

/// Which login a pool connects as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Request traffic; subject to row-level security.
    Application,
    /// Provisioning and the audit trail.
    Admin,
}

/// Create a database connection pool.
pub async fn create_pool(config: &DatabaseConfig, kind: PoolKind) -> Result<PgPool> {
    let (url, max_connections, min_connections) = match kind {
        PoolKind::Application => (
            config.url.as_str(),
            config.max_connections,
            config.min_connections,
        ),
        PoolKind::Admin => (config.admin_url(), config.admin_max_connections, 0),
    };
    info!(?kind, "Creating database connection pool...");

    let connect_options = PgConnectOptions::from_str(url).context("Invalid database URL")?;

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(Some(config.idle_timeout()))
        .connect_with(connect_options)
        .await
        .context("Failed to create database pool")?;

    verify_connection(&pool).await?;

    info!(?kind, max_connections, min_connections, "Database pool created");
    Ok(pool)
}

/// Verify database connection.
pub async fn verify_connection(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .context("Database connection verification failed")?;
    Ok(())
}

/// Get pool statistics.
pub fn pool_stats(pool: &PgPool) -> PoolStats {
    let idle = pool.num_idle();
    PoolStats {
        size: pool.size(),
        idle,
        active: pool.size().saturating_sub(idle as u32),
    }
}

/// Pool statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
    pub active: u32,
}
