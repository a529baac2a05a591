//! The policy provisioning engine.

use super::error::{is_missing_relation, ProvisionError};
use super::options::{ProvisionOptions, VectorOptions};
use super::report::ProvisionReport;
use crate::catalog::PolicyCatalog;
use crate::ddl::{self, PolicyDef, PolicyGroup};
use crate::plan::PolicyPlan;
use crate::seed::{self, MODELS_TABLE, PROVIDERS_TABLE};
use citadel_common_config::DeploymentMode;
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Outcome of one tolerated statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Done,
    Missing,
}

/// Applies the catalog's security objects through an elevated pool.
///
/// Every step checks before it creates, so a run can be repeated any number
/// of times. Steps run strictly in sequence; later ones depend on earlier ones
/// (the index needs the converted column, policies need RLS enabled).
pub struct PolicyProvisioner {
    pool: PgPool,
    catalog: PolicyCatalog,
    options: ProvisionOptions,
}

impl PolicyProvisioner {
    pub fn new(pool: PgPool, catalog: PolicyCatalog, options: ProvisionOptions) -> Self {
        Self {
            pool,
            catalog,
            options,
        }
    }

    pub fn catalog(&self) -> &PolicyCatalog {
        &self.catalog
    }

    /// Run every step. Any failure other than a not-yet-created relation
    /// aborts the run.
    pub async fn run(&self) -> Result<ProvisionReport, ProvisionError> {
        let plan = PolicyPlan::build(&self.catalog, &self.options.tenant_context())?;
        let mut report = ProvisionReport::default();

        info!(
            tables = plan.tables.len(),
            setting = %self.options.tenant_setting,
            "Provisioning row-level security"
        );

        if let Some(vector) = &self.options.vector {
            self.ensure_extension(vector).await?;
        }
        if let Some(role) = &self.options.app_role {
            self.grant_privileges(role, &mut report).await?;
        }

        let secured = self.secure_tables(&plan, &mut report).await?;
        self.install_group(&plan, &secured, PolicyGroup::AuthException, &mut report)
            .await?;
        self.install_group(&plan, &secured, PolicyGroup::Visibility, &mut report)
            .await?;

        if let Some(vector) = &self.options.vector {
            self.bootstrap_vector(vector, &mut report).await?;
        }
        if self.options.seed_reference_data {
            self.seed_reference_data(&mut report).await?;
        }

        info!(
            tables_secured = report.tables_secured,
            policies_created = report.policies_created,
            policies_present = report.policies_present,
            skipped = report.skipped.len(),
            seeded = ?report.seeded_tables,
            "Provisioning complete"
        );
        Ok(report)
    }

    async fn execute(&self, purpose: &str, sql: &str) -> Result<Applied, ProvisionError> {
        debug!(purpose, sql, "Executing provisioning statement");
        match sqlx::query(sql).execute(&self.pool).await {
            Ok(_) => Ok(Applied::Done),
            Err(e) if is_missing_relation(&e) => {
                warn!(purpose, error = %e, "Relation does not exist yet, skipping");
                Ok(Applied::Missing)
            }
            Err(e) => {
                error!(purpose, error = %e, "Provisioning statement failed");
                Err(ProvisionError::statement(purpose, e))
            }
        }
    }

    async fn ensure_extension(&self, vector: &VectorOptions) -> Result<(), ProvisionError> {
        let sql = ddl::create_extension(&vector.extension)?;
        self.execute(&format!("create extension {}", vector.extension), &sql)
            .await?;
        Ok(())
    }

    async fn grant_privileges(
        &self,
        role: &str,
        report: &mut ProvisionReport,
    ) -> Result<(), ProvisionError> {
        self.execute(&format!("ensure role {role}"), &ddl::ensure_role(role)?)
            .await?;
        self.execute(
            &format!("grant schema usage to {role}"),
            &ddl::grant_schema_usage(role)?,
        )
        .await?;

        for entry in &self.catalog.entries {
            let sql = ddl::grant_table(&entry.table, role)?;
            match self
                .execute(&format!("grant {} to {role}", entry.table), &sql)
                .await?
            {
                Applied::Done => report.grants_applied += 1,
                Applied::Missing => report.skip(format!("grant:{}", entry.table)),
            }
        }
        Ok(())
    }

    /// Enable and force RLS, then install the owner policy. Returns the
    /// tables that exist and were secured.
    async fn secure_tables(
        &self,
        plan: &PolicyPlan,
        report: &mut ProvisionReport,
    ) -> Result<HashSet<String>, ProvisionError> {
        let mut secured = HashSet::new();

        for table in &plan.tables {
            let name = table.table.as_str();
            let enabled = self
                .execute(&format!("enable RLS on {name}"), &ddl::enable_rls(name)?)
                .await?;
            if enabled == Applied::Missing {
                report.skip(name);
                continue;
            }
            self.execute(&format!("force RLS on {name}"), &ddl::force_rls(name)?)
                .await?;

            for policy in table.in_group(PolicyGroup::TenantIsolation) {
                self.install_policy(policy, report).await?;
            }
            secured.insert(name.to_string());
            report.tables_secured += 1;
        }
        Ok(secured)
    }

    async fn install_group(
        &self,
        plan: &PolicyPlan,
        secured: &HashSet<String>,
        group: PolicyGroup,
        report: &mut ProvisionReport,
    ) -> Result<(), ProvisionError> {
        for policy in plan.policies_in(group) {
            if !secured.contains(&policy.table) {
                debug!(policy = %policy.name, "Table not secured, skipping policy");
                continue;
            }
            self.install_policy(policy, report).await?;
        }
        Ok(())
    }

    async fn install_policy(
        &self,
        policy: &PolicyDef,
        report: &mut ProvisionReport,
    ) -> Result<(), ProvisionError> {
        let exists: bool = sqlx::query_scalar(ddl::POLICY_EXISTS)
            .bind(&policy.table)
            .bind(&policy.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ProvisionError::statement(format!("look up policy {}", policy.name), e))?;

        if exists {
            debug!(policy = %policy.name, "Policy already present");
            report.policies_present += 1;
            return Ok(());
        }

        let purpose = format!("create {} policy {}", policy.group, policy.name);
        match self.execute(&purpose, &ddl::create_policy(policy)?).await? {
            Applied::Done => {
                info!(policy = %policy.name, table = %policy.table, "Policy created");
                report.policies_created += 1;
            }
            Applied::Missing => report.skip(format!("policy:{}", policy.name)),
        }
        Ok(())
    }

    async fn bootstrap_vector(
        &self,
        vector: &VectorOptions,
        report: &mut ProvisionReport,
    ) -> Result<(), ProvisionError> {
        let target = format!("{}.{}", vector.table, vector.column);

        let udt: Option<String> = sqlx::query_scalar(ddl::COLUMN_UDT)
            .bind(&vector.table)
            .bind(&vector.column)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ProvisionError::statement(format!("inspect {target}"), e))?;

        let converted = match udt.as_deref() {
            None => {
                warn!(column = %target, "Vector column does not exist yet, skipping");
                report.skip(target);
                return Ok(());
            }
            Some("vector") => false,
            // Array types are reported with a leading underscore (_float4, _float8).
            Some(array) if array.starts_with('_') => {
                let sql = ddl::convert_to_vector(&vector.table, &vector.column, vector.dimensions)?;
                let applied = self
                    .execute(&format!("convert {target} from {array} to vector"), &sql)
                    .await?;
                applied == Applied::Done
            }
            Some(other) => {
                warn!(column = %target, udt = other, "Unexpected column type, leaving untouched");
                report.skip(target);
                return Ok(());
            }
        };

        if converted {
            report.vector_column_converted = true;
            self.execute(
                &format!("drop stale index {}", vector.index_name),
                &ddl::drop_index(&vector.index_name)?,
            )
            .await?;
        }

        let sql = ddl::create_ann_index(
            &vector.index_name,
            &vector.table,
            &vector.column,
            vector.index_lists,
        )?;
        self.execute(&format!("create index {}", vector.index_name), &sql)
            .await?;
        Ok(())
    }

    /// `None` when the table does not exist yet.
    async fn is_empty(&self, table: &str) -> Result<Option<bool>, ProvisionError> {
        let sql = ddl::count_rows(table)?;
        match sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.pool).await {
            Ok(count) => Ok(Some(count == 0)),
            Err(e) if is_missing_relation(&e) => {
                warn!(table, "Seed table does not exist yet, skipping");
                Ok(None)
            }
            Err(e) => Err(ProvisionError::statement(format!("count rows in {table}"), e)),
        }
    }

    /// Seed each table once, only while it is empty. All rows of a table go in
    /// one transaction so a table is never left half seeded.
    async fn seed_reference_data(&self, report: &mut ProvisionReport) -> Result<(), ProvisionError> {
        match self.is_empty(PROVIDERS_TABLE).await? {
            None => report.skip(PROVIDERS_TABLE),
            Some(false) => report.already_seeded.push(PROVIDERS_TABLE.to_string()),
            Some(true) => {
                let mut tx = self.pool.begin().await?;
                for provider in seed::default_providers() {
                    sqlx::query(seed::INSERT_PROVIDER)
                        .bind(provider.key)
                        .bind(provider.display_name)
                        .bind(provider.base_url)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| ProvisionError::statement(format!("seed provider {}", provider.key), e))?;
                }
                tx.commit().await?;
                info!(table = PROVIDERS_TABLE, "Reference data seeded");
                report.seeded_tables.push(PROVIDERS_TABLE.to_string());
            }
        }

        match self.is_empty(MODELS_TABLE).await? {
            None => report.skip(MODELS_TABLE),
            Some(false) => report.already_seeded.push(MODELS_TABLE.to_string()),
            Some(true) => {
                let mut tx = self.pool.begin().await?;
                for model in seed::default_models() {
                    sqlx::query(seed::INSERT_MODEL)
                        .bind(model.provider_key)
                        .bind(model.model_key)
                        .bind(model.display_name)
                        .bind(model.kind.as_str())
                        .bind(model.dimensions)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| ProvisionError::statement(format!("seed model {}", model.model_key), e))?;
                }
                tx.commit().await?;
                info!(table = MODELS_TABLE, "Reference data seeded");
                report.seeded_tables.push(MODELS_TABLE.to_string());
            }
        }
        Ok(())
    }
}

/// Provision only where the deployment mode allows it.
///
/// Outside development the same objects ship as reviewed migrations, so this
/// returns `Ok(None)` without touching the database.
pub async fn provision_on_startup(
    mode: DeploymentMode,
    pool: PgPool,
    catalog: PolicyCatalog,
    options: ProvisionOptions,
) -> Result<Option<ProvisionReport>, ProvisionError> {
    if !mode.provisions_on_startup() {
        info!(%mode, "Skipping policy provisioning; security objects ship as migrations");
        return Ok(None);
    }
    PolicyProvisioner::new(pool, catalog, options)
        .run()
        .await
        .map(Some)
}
