//! Render the provisioning steps as an idempotent SQL script.
//!
//! Environments other than development never provision at startup; they get
//! this script checked in as a reviewed migration instead.

use crate::catalog::PolicyCatalog;
use crate::ddl;
use crate::ident;
use crate::plan::PolicyPlan;
use crate::provision::{ProvisionError, ProvisionOptions, VectorOptions};
use crate::seed::{self, MODELS_TABLE, PROVIDERS_TABLE};
use std::fmt::Write;

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn push(script: &mut String, statement: &str) {
    script.push_str(statement);
    script.push_str(";\n");
}

fn section(script: &mut String, title: &str) {
    let _ = write!(script, "\n-- {title}\n");
}

pub fn render_script(
    catalog: &PolicyCatalog,
    options: &ProvisionOptions,
) -> Result<String, ProvisionError> {
    let plan = PolicyPlan::build(catalog, &options.tenant_context())?;
    let mut script = String::from("-- Row-level security objects generated by citadel-policy.\n");
    script.push_str("-- Safe to apply repeatedly.\n");

    if let Some(vector) = &options.vector {
        section(&mut script, "Extensions");
        push(&mut script, &ddl::create_extension(&vector.extension)?);
    }

    if let Some(role) = &options.app_role {
        section(&mut script, "Application role");
        push(&mut script, &ddl::ensure_role(role)?);
        push(&mut script, &ddl::grant_schema_usage(role)?);
        for entry in &catalog.entries {
            push(&mut script, &ddl::grant_table(&entry.table, role)?);
        }
    }

    for table in &plan.tables {
        section(&mut script, &format!("{} ({:?})", table.table, table.isolation));
        push(&mut script, &ddl::enable_rls(&table.table)?);
        push(&mut script, &ddl::force_rls(&table.table)?);
        for policy in &table.policies {
            push(&mut script, &ddl::create_policy_if_absent(policy)?);
        }
    }

    if let Some(vector) = &options.vector {
        section(&mut script, "Similarity search");
        push(&mut script, &vector_conversion(vector)?);
        push(
            &mut script,
            &ddl::create_ann_index(
                &vector.index_name,
                &vector.table,
                &vector.column,
                vector.index_lists,
            )?,
        );
    }

    if options.seed_reference_data {
        section(&mut script, "Reference data (only into empty tables)");
        push(&mut script, &seed_providers()?);
        push(&mut script, &seed_models()?);
    }

    Ok(script)
}

fn vector_conversion(vector: &VectorOptions) -> Result<String, ProvisionError> {
    let table = ident::checked(&vector.table)?;
    let column = ident::checked(&vector.column)?;
    let alter = ddl::convert_to_vector(table, column, vector.dimensions)?;
    Ok(format!(
        "DO $$\nBEGIN\n    IF EXISTS (SELECT 1 FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = '{table}' \
         AND column_name = '{column}' AND left(udt_name::text, 1) = '_') THEN\n        \
         {alter};\n    END IF;\nEND\n$$"
    ))
}

fn seed_providers() -> Result<String, ProvisionError> {
    let table = ident::checked(PROVIDERS_TABLE)?;
    let rows: Vec<String> = seed::default_providers()
        .iter()
        .map(|p| {
            format!(
                "({}, {}, {})",
                literal(p.key),
                literal(p.display_name),
                literal(p.base_url)
            )
        })
        .collect();
    Ok(format!(
        "INSERT INTO {table} (key, display_name, base_url)\n\
         SELECT * FROM (VALUES\n    {}\n) AS v(key, display_name, base_url)\n\
         WHERE NOT EXISTS (SELECT 1 FROM {table})",
        rows.join(",\n    ")
    ))
}

fn seed_models() -> Result<String, ProvisionError> {
    let providers = ident::checked(PROVIDERS_TABLE)?;
    let table = ident::checked(MODELS_TABLE)?;
    let rows: Vec<String> = seed::default_models()
        .iter()
        .map(|m| {
            let dims = m
                .dimensions
                .map(|d| d.to_string())
                .unwrap_or_else(|| "NULL::int".to_string());
            format!(
                "({}, {}, {}, {}, {dims})",
                literal(m.provider_key),
                literal(m.model_key),
                literal(m.display_name),
                literal(m.kind.as_str()),
            )
        })
        .collect();
    Ok(format!(
        "INSERT INTO {table} (provider_id, model_key, display_name, kind, dimensions)\n\
         SELECT p.id, v.model_key, v.display_name, v.kind, v.dimensions FROM (VALUES\n    {}\n) \
         AS v(provider_key, model_key, display_name, kind, dimensions)\n\
         JOIN {providers} p ON p.key = v.provider_key\n\
         WHERE NOT EXISTS (SELECT 1 FROM {table})",
        rows.join(",\n    ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PolicyEntry;

    #[test]
    fn test_script_covers_every_policy() {
        let catalog = PolicyCatalog::platform();
        let options = ProvisionOptions::default().with_app_role("citadel_app");
        let script = render_script(&catalog, &options).unwrap();

        let plan = PolicyPlan::build(&catalog, &options.tenant_context()).unwrap();
        for policy in plan.policies() {
            assert!(
                script.contains(&format!("CREATE POLICY {} ON {}", policy.name, policy.table)),
                "{}",
                policy.name
            );
        }
        assert!(script.contains("ALTER TABLE assets FORCE ROW LEVEL SECURITY;"));
        assert!(script.contains("GRANT SELECT, INSERT, UPDATE, DELETE ON llm_models TO citadel_app;"));
        assert!(script.contains("CREATE EXTENSION IF NOT EXISTS vector;"));
    }

    #[test]
    fn test_exempt_tables_are_not_secured() {
        let script = render_script(&PolicyCatalog::platform(), &ProvisionOptions::default()).unwrap();
        assert!(!script.contains("ALTER TABLE tenants ENABLE"));
        assert!(!script.contains("ALTER TABLE llm_providers ENABLE"));
    }

    #[test]
    fn test_seeds_only_into_empty_tables() {
        let script = render_script(&PolicyCatalog::platform(), &ProvisionOptions::default()).unwrap();
        assert!(script.contains("WHERE NOT EXISTS (SELECT 1 FROM llm_providers)"));
        assert!(script.contains("WHERE NOT EXISTS (SELECT 1 FROM llm_models)"));

        let bare = render_script(
            &PolicyCatalog::platform(),
            &ProvisionOptions::default().without_seeds(),
        )
        .unwrap();
        assert!(!bare.contains("INSERT INTO"));
    }

    #[test]
    fn test_unsafe_catalog_renders_nothing() {
        let catalog = PolicyCatalog::new(vec![PolicyEntry::standard("x'; DROP TABLE y; --")]);
        assert!(matches!(
            render_script(&catalog, &ProvisionOptions::default()),
            Err(ProvisionError::Catalog(_))
        ));
    }

    #[test]
    fn test_literal_escapes_quotes() {
        assert_eq!(literal("O'Hare"), "'O''Hare'");
    }
}
