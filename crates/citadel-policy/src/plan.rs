//! Compose catalog entries into concrete policy definitions.

use crate::catalog::{
    CatalogError, ExceptionCommand, ExceptionPolicy, IsolationKind, PolicyCatalog, PolicyEntry,
};
use crate::ddl::{PolicyDef, PolicyGroup, PolicyScope, TenantContext};
use crate::ident::{self, IdentError};
use serde::Serialize;

/// Prefix of the owner policy on every protected table.
pub const TENANT_ISOLATION_PREFIX: &str = "tenant_isolation";
/// Prefix of the widened read policy on visibility tables.
pub const VISIBILITY_READ_PREFIX: &str = "visibility_read";

/// Status a visibility row must have to be readable outside its owner.
pub const PUBLISHED_STATUS: &str = "published";

/// Name policies as `<prefix>_<table>` so reruns can find them.
pub fn policy_name(prefix: &str, table: &str) -> Result<String, IdentError> {
    let name = format!("{}_{}", ident::checked(prefix)?, ident::checked(table)?);
    ident::checked(&name)?;
    Ok(name)
}

/// Everything the engine installs on one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePlan {
    pub table: String,
    pub isolation: IsolationKind,
    pub policies: Vec<PolicyDef>,
}

impl TablePlan {
    pub fn in_group(&self, group: PolicyGroup) -> impl Iterator<Item = &PolicyDef> {
        self.policies.iter().filter(move |p| p.group == group)
    }
}

/// Policies for the whole catalog, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyPlan {
    pub tenant_context: TenantContext,
    pub tables: Vec<TablePlan>,
}

impl PolicyPlan {
    pub fn build(catalog: &PolicyCatalog, ctx: &TenantContext) -> Result<Self, CatalogError> {
        catalog.validate()?;
        let tenant = ctx.expr()?;

        let tables = catalog
            .protected()
            .map(|entry| table_plan(entry, &tenant))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            tenant_context: ctx.clone(),
            tables,
        })
    }

    pub fn policies(&self) -> impl Iterator<Item = &PolicyDef> {
        self.tables.iter().flat_map(|t| t.policies.iter())
    }

    pub fn policies_in(&self, group: PolicyGroup) -> impl Iterator<Item = &PolicyDef> {
        self.policies().filter(move |p| p.group == group)
    }
}

fn table_plan(entry: &PolicyEntry, tenant: &str) -> Result<TablePlan, CatalogError> {
    let table = ident::checked(&entry.table)?;
    let owner = format!("tenant_id = {tenant}");

    let mut policies = vec![PolicyDef {
        name: policy_name(TENANT_ISOLATION_PREFIX, table)?,
        table: table.to_string(),
        group: PolicyGroup::TenantIsolation,
        scope: PolicyScope::All,
        using: Some(owner.clone()),
        with_check: Some(owner),
    }];

    for exception in entry.exceptions() {
        policies.push(exception_policy(table, exception, tenant)?);
    }

    if entry.isolation == IsolationKind::Visibility {
        let using = match &entry.parent {
            None => visible_predicate("", tenant),
            Some(link) => {
                let parent = ident::checked(&link.table)?;
                let fk = ident::checked(&link.foreign_key)?;
                format!(
                    "EXISTS (SELECT 1 FROM {parent} p WHERE p.id = {table}.{fk} AND {})",
                    visible_predicate("p.", tenant)
                )
            }
        };
        policies.push(PolicyDef {
            name: policy_name(VISIBILITY_READ_PREFIX, table)?,
            table: table.to_string(),
            group: PolicyGroup::Visibility,
            scope: PolicyScope::Select,
            using: Some(using),
            with_check: None,
        });
    }

    Ok(TablePlan {
        table: table.to_string(),
        isolation: entry.isolation,
        policies,
    })
}

/// Published, not soft-deleted, and either public or shared with the tenant.
fn visible_predicate(alias: &str, tenant: &str) -> String {
    format!(
        "{alias}status = '{PUBLISHED_STATUS}' AND {alias}deleted_at IS NULL AND \
         ({alias}visibility = 'public' OR \
         ({alias}visibility = 'restricted' AND {tenant} = ANY({alias}allowed_tenants)))"
    )
}

fn exception_policy(
    table: &str,
    exception: &ExceptionPolicy,
    tenant: &str,
) -> Result<PolicyDef, CatalogError> {
    let mut predicate = format!("{tenant} IS NULL");
    if let Some(column) = &exception.require_column {
        predicate.push_str(&format!(" AND {} IS NOT NULL", ident::checked(column)?));
    }

    let (scope, using, with_check) = match exception.command {
        ExceptionCommand::Select => (PolicyScope::Select, Some(predicate), None),
        ExceptionCommand::Insert => (PolicyScope::Insert, None, Some(predicate)),
        ExceptionCommand::Update => (PolicyScope::Update, Some(predicate.clone()), Some(predicate)),
    };

    Ok(PolicyDef {
        name: policy_name(&exception.purpose, table)?,
        table: table.to_string(),
        group: PolicyGroup::AuthException,
        scope,
        using,
        with_check,
    })
}
