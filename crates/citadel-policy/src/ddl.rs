//! DDL statement builder.
//!
//! Every function validates each identifier it interpolates, even when the
//! caller already validated the same value elsewhere.

use crate::ident::{checked, checked_setting, IdentError};
use serde::Serialize;
use std::fmt;

/// Query used to find a policy from an earlier run by name.
pub const POLICY_EXISTS: &str = "SELECT EXISTS (\
    SELECT 1 FROM pg_policies \
    WHERE schemaname = current_schema() AND tablename = $1 AND policyname = $2)";

/// Data type of a column as reported by `information_schema`, `NULL` when the
/// column does not exist yet.
pub const COLUMN_UDT: &str = "SELECT udt_name::text FROM information_schema.columns \
    WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2";

/// The tenant bound to the current transaction, as a SQL expression.
///
/// `current_setting(.., true)` yields `NULL` when the setting was never
/// defined on the connection and `''` once a transaction-local value has been
/// reset, so both collapse to `NULL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantContext {
    pub setting: String,
}

impl TenantContext {
    pub const DEFAULT_SETTING: &'static str = "app.current_tenant";

    pub fn new(setting: impl Into<String>) -> Self {
        Self {
            setting: setting.into(),
        }
    }

    pub fn expr(&self) -> Result<String, IdentError> {
        let setting = checked_setting(&self.setting)?;
        Ok(format!("NULLIF(current_setting('{setting}', true), '')::uuid"))
    }
}

impl Default for TenantContext {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SETTING)
    }
}

/// Which part of the security model a policy belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyGroup {
    TenantIsolation,
    AuthException,
    Visibility,
}

impl fmt::Display for PolicyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TenantIsolation => "tenant isolation",
            Self::AuthException => "authentication exception",
            Self::Visibility => "visibility",
        })
    }
}

/// `FOR` clause of a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyScope {
    All,
    Select,
    Insert,
    Update,
}

impl PolicyScope {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
        }
    }
}

/// A fully composed policy, ready to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDef {
    pub name: String,
    pub table: String,
    pub group: PolicyGroup,
    pub scope: PolicyScope,
    pub using: Option<String>,
    pub with_check: Option<String>,
}

pub fn enable_rls(table: &str) -> Result<String, IdentError> {
    Ok(format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY", checked(table)?))
}

/// Apply policies to the table owner too.
pub fn force_rls(table: &str) -> Result<String, IdentError> {
    Ok(format!("ALTER TABLE {} FORCE ROW LEVEL SECURITY", checked(table)?))
}

pub fn create_policy(def: &PolicyDef) -> Result<String, IdentError> {
    let mut sql = format!(
        "CREATE POLICY {} ON {} AS PERMISSIVE FOR {}",
        checked(&def.name)?,
        checked(&def.table)?,
        def.scope.as_sql()
    );
    if let Some(using) = &def.using {
        sql.push_str(&format!(" USING ({using})"));
    }
    if let Some(check) = &def.with_check {
        sql.push_str(&format!(" WITH CHECK ({check})"));
    }
    Ok(sql)
}

/// `CREATE POLICY` guarded by a catalog lookup, for migration scripts.
pub fn create_policy_if_absent(def: &PolicyDef) -> Result<String, IdentError> {
    let create = create_policy(def)?;
    Ok(format!(
        "DO $$\nBEGIN\n    IF NOT EXISTS (SELECT 1 FROM pg_policies \
         WHERE schemaname = current_schema() AND tablename = '{}' AND policyname = '{}') THEN\n        \
         {create};\n    END IF;\nEND\n$$",
        checked(&def.table)?,
        checked(&def.name)?,
    ))
}

/// Create a `NOLOGIN` role unless one with that name exists.
pub fn ensure_role(role: &str) -> Result<String, IdentError> {
    let role = checked(role)?;
    Ok(format!(
        "DO $$\nBEGIN\n    IF NOT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = '{role}') THEN\n        \
         CREATE ROLE {role} NOLOGIN;\n    END IF;\nEXCEPTION WHEN duplicate_object THEN\n    NULL;\nEND\n$$"
    ))
}

/// Usage on the schema the catalogued tables resolve to, the same
/// `current_schema()` the policy lookups use.
pub fn grant_schema_usage(role: &str) -> Result<String, IdentError> {
    let role = checked(role)?;
    Ok(format!(
        "DO $$\nBEGIN\n    EXECUTE format('GRANT USAGE ON SCHEMA %I TO {role}', current_schema());\nEND\n$$"
    ))
}

pub fn grant_table(table: &str, role: &str) -> Result<String, IdentError> {
    Ok(format!(
        "GRANT SELECT, INSERT, UPDATE, DELETE ON {} TO {}",
        checked(table)?,
        checked(role)?
    ))
}

pub fn count_rows(table: &str) -> Result<String, IdentError> {
    Ok(format!("SELECT COUNT(*) FROM {}", checked(table)?))
}

pub fn create_extension(extension: &str) -> Result<String, IdentError> {
    Ok(format!("CREATE EXTENSION IF NOT EXISTS {}", checked(extension)?))
}

/// Convert a generic array column to a fixed-dimension `vector`.
pub fn convert_to_vector(table: &str, column: &str, dimensions: u32) -> Result<String, IdentError> {
    let table = checked(table)?;
    let column = checked(column)?;
    Ok(format!(
        "ALTER TABLE {table} ALTER COLUMN {column} TYPE vector({dimensions}) \
         USING {column}::vector({dimensions})"
    ))
}

pub fn drop_index(index: &str) -> Result<String, IdentError> {
    Ok(format!("DROP INDEX IF EXISTS {}", checked(index)?))
}

/// Approximate nearest neighbour index for cosine similarity.
pub fn create_ann_index(
    index: &str,
    table: &str,
    column: &str,
    lists: u32,
) -> Result<String, IdentError> {
    Ok(format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} USING ivfflat ({} vector_cosine_ops) WITH (lists = {lists})",
        checked(index)?,
        checked(table)?,
        checked(column)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolation_def(table: &str) -> PolicyDef {
        PolicyDef {
            name: format!("tenant_isolation_{table}"),
            table: table.to_string(),
            group: PolicyGroup::TenantIsolation,
            scope: PolicyScope::All,
            using: Some("tenant_id = x".into()),
            with_check: Some("tenant_id = x".into()),
        }
    }

    #[test]
    fn test_tenant_expr_uses_transaction_setting() {
        let expr = TenantContext::default().expr().unwrap();
        assert_eq!(
            expr,
            "NULLIF(current_setting('app.current_tenant', true), '')::uuid"
        );
        assert!(TenantContext::new("tenant'); DROP").expr().is_err());
    }

    #[test]
    fn test_rls_statements() {
        assert_eq!(enable_rls("assets").unwrap(), "ALTER TABLE assets ENABLE ROW LEVEL SECURITY");
        assert_eq!(force_rls("assets").unwrap(), "ALTER TABLE assets FORCE ROW LEVEL SECURITY");
        assert!(force_rls("assets;").is_err());
    }

    #[test]
    fn test_create_policy_renders_clauses() {
        let sql = create_policy(&isolation_def("assets")).unwrap();
        assert_eq!(
            sql,
            "CREATE POLICY tenant_isolation_assets ON assets AS PERMISSIVE FOR ALL \
             USING (tenant_id = x) WITH CHECK (tenant_id = x)"
        );
    }

    #[test]
    fn test_create_policy_revalidates_table() {
        let mut def = isolation_def("assets");
        def.table = "assets USING (true); --".into();
        assert!(create_policy(&def).is_err());
        assert!(create_policy_if_absent(&def).is_err());
    }

    #[test]
    fn test_guarded_policy_checks_catalog_by_name() {
        let sql = create_policy_if_absent(&isolation_def("folders")).unwrap();
        assert!(sql.contains("tablename = 'folders' AND policyname = 'tenant_isolation_folders'"));
        assert!(sql.contains("CREATE POLICY tenant_isolation_folders ON folders"));
    }

    #[test]
    fn test_vector_statements() {
        assert_eq!(
            convert_to_vector("knowledge_chunks", "embedding", 1536).unwrap(),
            "ALTER TABLE knowledge_chunks ALTER COLUMN embedding TYPE vector(1536) \
             USING embedding::vector(1536)"
        );
        let idx = create_ann_index("chunks_embedding_idx", "knowledge_chunks", "embedding", 100)
            .unwrap();
        assert!(idx.starts_with("CREATE INDEX IF NOT EXISTS chunks_embedding_idx"));
        assert!(idx.ends_with("WITH (lists = 100)"));
    }

    #[test]
    fn test_role_statements() {
        assert!(ensure_role("citadel_app").unwrap().contains("CREATE ROLE citadel_app NOLOGIN"));
        assert!(ensure_role("app' OR '1'='1").is_err());
        assert_eq!(
            grant_table("assets", "citadel_app").unwrap(),
            "GRANT SELECT, INSERT, UPDATE, DELETE ON assets TO citadel_app"
        );
    }

    #[test]
    fn test_schema_usage_follows_current_schema() {
        let sql = grant_schema_usage("citadel_app").unwrap();
        assert!(sql.contains("GRANT USAGE ON SCHEMA %I TO citadel_app"));
        assert!(sql.contains("current_schema()"));
        assert!(!sql.contains("public"));
        assert!(grant_schema_usage("app; DROP ROLE x").is_err());
    }
}
