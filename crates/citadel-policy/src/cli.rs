//! `citadel-policy` command line.

use crate::catalog::PolicyCatalog;
use crate::plan::PolicyPlan;
use crate::provision::{provision_on_startup, ProvisionOptions, VectorOptions};
use crate::render::render_script;
use anyhow::{bail, Context, Result};
use citadel_common_config::Environment;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "citadel-policy")]
#[command(about = "Row-level security provisioning")]
pub struct PolicyCli {
    #[command(subcommand)]
    pub command: PolicyCommand,

    /// Elevated database URL used to apply policies
    #[arg(long, env = "ADMIN_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Configuration parameter holding the bound tenant
    #[arg(long, default_value = "app.current_tenant")]
    pub tenant_setting: String,

    /// Role granted DML on catalogued tables
    #[arg(long, env = "CITADEL_APP_ROLE")]
    pub app_role: Option<String>,

    /// Skip the vector extension, column conversion and index
    #[arg(long)]
    pub no_vector: bool,

    /// Skip reference data seeding
    #[arg(long)]
    pub no_seed: bool,
}

#[derive(Subcommand)]
pub enum PolicyCommand {
    /// Apply the catalog to the database (development only)
    Provision,

    /// Print the SQL script for a reviewed migration
    Render {
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show catalogued tables and their policies
    Catalog {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
}

impl PolicyCli {
    pub fn options(&self) -> ProvisionOptions {
        ProvisionOptions {
            tenant_setting: self.tenant_setting.clone(),
            app_role: self.app_role.clone(),
            vector: (!self.no_vector).then(VectorOptions::default),
            seed_reference_data: !self.no_seed,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let catalog = PolicyCatalog::platform();
        match &self.command {
            PolicyCommand::Provision => self.provision(catalog).await,
            PolicyCommand::Render { output } => self.render(&catalog, output.as_ref()).await,
            PolicyCommand::Catalog { json } => self.show_catalog(&catalog, *json),
        }
    }

    async fn provision(&self, catalog: PolicyCatalog) -> Result<()> {
        let mode = Environment::deployment_mode()?;
        if !mode.provisions_on_startup() {
            bail!("refusing to provision in {mode}; apply `citadel-policy render` as a migration instead");
        }
        let url = self
            .database_url
            .as_deref()
            .context("ADMIN_DATABASE_URL or --database-url is required")?;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .context("Failed to connect with elevated credentials")?;

        let report = provision_on_startup(mode, pool, catalog, self.options()).await?;
        if let Some(report) = report {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Ok(())
    }

    async fn render(&self, catalog: &PolicyCatalog, output: Option<&PathBuf>) -> Result<()> {
        let script = render_script(catalog, &self.options())?;
        match output {
            Some(path) => {
                tokio::fs::write(path, script)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), "Policy script written");
            }
            None => print!("{script}"),
        }
        Ok(())
    }

    fn show_catalog(&self, catalog: &PolicyCatalog, json: bool) -> Result<()> {
        let plan = PolicyPlan::build(catalog, &self.options().tenant_context())?;
        if json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
            return Ok(());
        }

        for entry in &catalog.entries {
            println!("{:<28} {:?}", entry.table, entry.isolation);
            if let Some(table) = plan.tables.iter().find(|t| t.table == entry.table) {
                for policy in &table.policies {
                    println!("    {:<44} {:<7} {}", policy.name, policy.scope.as_sql(), policy.group);
                }
            }
        }
        Ok(())
    }
}
