//! Transaction-local tenant binding.
//!
//! The tenant travels as a custom setting written with
//! `set_config(name, value, true)`, which lasts until the enclosing
//! transaction ends. A connection therefore never carries a tenant back into
//! the pool, and two transactions on the same connection never see each
//! other's binding.

use crate::config::DatabaseConfig;
use citadel_common_core::TenantId;
use citadel_policy::{ident, IdentError};
use futures::future::BoxFuture;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, warn};

/// How scoped transactions are prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    tenant_setting: String,
    app_role: Option<String>,
}

impl TenantScope {
    pub fn new(
        tenant_setting: impl Into<String>,
        app_role: Option<String>,
    ) -> Result<Self, IdentError> {
        let tenant_setting = tenant_setting.into();
        ident::checked_setting(&tenant_setting)?;
        if let Some(role) = &app_role {
            ident::checked(role)?;
        }
        Ok(Self {
            tenant_setting,
            app_role,
        })
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self, IdentError> {
        Self::new(config.tenant_setting.clone(), config.app_role.clone())
    }

    pub fn tenant_setting(&self) -> &str {
        &self.tenant_setting
    }

    pub fn app_role(&self) -> Option<&str> {
        self.app_role.as_deref()
    }

    /// Open a transaction and bind `tenant` into it before returning.
    ///
    /// Without a tenant the setting stays unset and only the exception
    /// policies can match.
    pub async fn begin(
        &self,
        pool: &PgPool,
        tenant: Option<TenantId>,
    ) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        // On error the dropped transaction rolls back.
        self.bind(&mut *tx, tenant).await?;
        Ok(tx)
    }

    /// Apply the role switch and tenant binding to an open transaction.
    pub async fn bind(
        &self,
        conn: &mut PgConnection,
        tenant: Option<TenantId>,
    ) -> Result<(), sqlx::Error> {
        if let Some(role) = &self.app_role {
            let role = ident::checked(role).map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;
            sqlx::query(&format!("SET LOCAL ROLE {role}"))
                .execute(&mut *conn)
                .await?;
        }

        if let Some(tenant) = tenant {
            sqlx::query("SELECT set_config($1, $2, true)")
                .bind(&self.tenant_setting)
                .bind(tenant.setting_value())
                .execute(&mut *conn)
                .await?;
            debug!(tenant_id = %tenant, "Tenant bound to transaction");
        }
        Ok(())
    }
}

impl Default for TenantScope {
    fn default() -> Self {
        Self {
            tenant_setting: citadel_policy::TenantContext::DEFAULT_SETTING.to_string(),
            app_role: None,
        }
    }
}

/// Run `f` inside a transaction bound to `tenant`.
///
/// For work that does not arrive over HTTP (queue processors, scheduled
/// jobs). Commits when `f` returns `Ok`, rolls back otherwise.
pub async fn with_tenant_scope<F, T, E>(
    pool: &PgPool,
    scope: &TenantScope,
    tenant: TenantId,
    f: F,
) -> Result<T, E>
where
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>>,
    E: From<sqlx::Error>,
{
    let mut tx = scope.begin(pool, Some(tenant)).await?;

    match f(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(tenant_id = %tenant, error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}
