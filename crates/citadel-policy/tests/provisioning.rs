//! Provisioning against a live PostgreSQL.
//!
//! Set `CITADEL_TEST_DATABASE_URL` to a superuser URL to run these; without it
//! they return immediately.

use citadel_policy::{
    PolicyCatalog, PolicyProvisioner, ProvisionError, ProvisionOptions, VectorOptions,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

const APP_ROLE: &str = "citadel_policy_test_app";

lazy_static::lazy_static! {
    // Grants to a shared role race when issued from parallel tests.
    static ref SERIAL: tokio::sync::Mutex<()> = tokio::sync::Mutex::new(());
}

const SCHEMA: &str = r#"
CREATE TABLE tenants (id uuid PRIMARY KEY, name text NOT NULL);
CREATE TABLE users (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant_id uuid REFERENCES tenants(id),
    email text NOT NULL
);
CREATE TABLE invitations (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant_id uuid NOT NULL REFERENCES tenants(id),
    token text
);
CREATE TABLE assets (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant_id uuid NOT NULL REFERENCES tenants(id),
    name text NOT NULL
);
CREATE TABLE workflow_templates (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant_id uuid NOT NULL REFERENCES tenants(id),
    name text NOT NULL,
    status text NOT NULL DEFAULT 'draft',
    visibility text NOT NULL DEFAULT 'private',
    allowed_tenants uuid[] NOT NULL DEFAULT '{}',
    deleted_at timestamptz
);
CREATE TABLE workflow_template_versions (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    tenant_id uuid NOT NULL REFERENCES tenants(id),
    template_id uuid NOT NULL REFERENCES workflow_templates(id),
    version int NOT NULL
);
CREATE TABLE llm_providers (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    key text NOT NULL UNIQUE,
    display_name text NOT NULL,
    base_url text NOT NULL
);
CREATE TABLE llm_models (
    id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
    provider_id uuid NOT NULL REFERENCES llm_providers(id),
    model_key text NOT NULL,
    display_name text NOT NULL,
    kind text NOT NULL,
    dimensions int
);
"#;

/// A pool whose connections all live in a fresh schema.
async fn scratch_pool() -> Option<(PgPool, String)> {
    let url = std::env::var("CITADEL_TEST_DATABASE_URL").ok()?;
    let schema = format!("citadel_policy_{}", uuid::Uuid::new_v4().simple());

    let admin = PgPoolOptions::new().max_connections(1).connect(&url).await.unwrap();
    admin
        .execute(format!("CREATE SCHEMA {schema}").as_str())
        .await
        .unwrap();
    admin.close().await;

    let search_path = schema.clone();
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .after_connect(move |conn, _meta| {
            let sql = format!("SET search_path TO {search_path}, public");
            Box::pin(async move {
                conn.execute(sql.as_str()).await?;
                Ok(())
            })
        })
        .connect(&url)
        .await
        .unwrap();
    Some((pool, schema))
}

async fn drop_schema(pool: &PgPool, schema: &str) {
    pool.execute(format!("DROP SCHEMA {schema} CASCADE").as_str())
        .await
        .unwrap();
}

fn options() -> ProvisionOptions {
    ProvisionOptions {
        vector: None,
        ..ProvisionOptions::default()
    }
    .with_app_role(APP_ROLE)
}

async fn policy_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM pg_policies WHERE schemaname = current_schema()")
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_first_run_skips_missing_tables() {
    let Some((pool, schema)) = scratch_pool().await else {
        return;
    };
    let _serial = SERIAL.lock().await;
    pool.execute(SCHEMA).await.unwrap();

    let report = PolicyProvisioner::new(pool.clone(), PolicyCatalog::platform(), options())
        .run()
        .await
        .unwrap();

    // folders, knowledge_chunks, workflow_runs and the chain tables are absent
    for missing in ["folders", "knowledge_chunks", "workflow_runs", "workflow_chains"] {
        assert!(report.skipped.iter().any(|s| s == missing), "{missing}");
    }
    assert_eq!(report.tables_secured, 5);
    assert_eq!(report.seeded_tables, vec!["llm_providers", "llm_models"]);

    let forced: bool = sqlx::query_scalar(
        "SELECT relforcerowsecurity FROM pg_class WHERE oid = 'assets'::regclass",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(forced);

    let usage: bool = sqlx::query_scalar(&format!(
        "SELECT has_schema_privilege('{APP_ROLE}', current_schema(), 'USAGE')"
    ))
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(usage, "app role can reach the provisioned schema");

    drop_schema(&pool, &schema).await;
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let Some((pool, schema)) = scratch_pool().await else {
        return;
    };
    let _serial = SERIAL.lock().await;
    pool.execute(SCHEMA).await.unwrap();
    let provisioner = PolicyProvisioner::new(pool.clone(), PolicyCatalog::platform(), options());

    let first = provisioner.run().await.unwrap();
    let policies_after_first = policy_count(&pool).await;
    let providers_after_first = count(&pool, "llm_providers").await;
    let models_after_first = count(&pool, "llm_models").await;

    let second = provisioner.run().await.unwrap();

    assert!(first.policies_created > 0);
    assert!(second.is_noop());
    assert_eq!(second.policies_present, first.policies_created);
    assert_eq!(second.already_seeded, vec!["llm_providers", "llm_models"]);
    assert_eq!(policy_count(&pool).await, policies_after_first);
    assert_eq!(count(&pool, "llm_providers").await, providers_after_first);
    assert_eq!(count(&pool, "llm_models").await, models_after_first);

    drop_schema(&pool, &schema).await;
}

#[tokio::test]
async fn test_partially_filled_seed_table_is_left_alone() {
    let Some((pool, schema)) = scratch_pool().await else {
        return;
    };
    let _serial = SERIAL.lock().await;
    pool.execute(SCHEMA).await.unwrap();
    pool.execute(
        "INSERT INTO llm_providers (key, display_name, base_url) \
         VALUES ('custom', 'Custom', 'http://custom')",
    )
    .await
    .unwrap();

    let report = PolicyProvisioner::new(pool.clone(), PolicyCatalog::platform(), options())
        .run()
        .await
        .unwrap();

    assert_eq!(report.already_seeded, vec!["llm_providers"]);
    assert_eq!(count(&pool, "llm_providers").await, 1);

    drop_schema(&pool, &schema).await;
}

#[tokio::test]
async fn test_unexpected_failure_is_fatal() {
    let Some((pool, schema)) = scratch_pool().await else {
        return;
    };
    let _serial = SERIAL.lock().await;
    // A view cannot carry row-level security; the failure is not a missing
    // relation and must abort the run.
    pool.execute("CREATE TABLE tenants (id uuid PRIMARY KEY); CREATE VIEW users AS SELECT 1 AS id")
        .await
        .unwrap();

    let result = PolicyProvisioner::new(
        pool.clone(),
        PolicyCatalog::platform(),
        options().without_seeds(),
    )
    .run()
    .await;

    match result {
        Err(ProvisionError::Statement { purpose, .. }) => {
            assert_eq!(purpose, "enable RLS on users")
        }
        other => panic!("expected a fatal statement error, got {other:?}"),
    }
    assert_eq!(policy_count(&pool).await, 0);

    drop_schema(&pool, &schema).await;
}

#[tokio::test]
async fn test_missing_tenant_column_is_fatal() {
    let Some((pool, schema)) = scratch_pool().await else {
        return;
    };
    let _serial = SERIAL.lock().await;
    // The table exists but cannot carry its isolation policy.
    pool.execute(
        "CREATE TABLE tenants (id uuid PRIMARY KEY); \
         CREATE TABLE users (id uuid PRIMARY KEY, email text NOT NULL)",
    )
    .await
    .unwrap();

    let result = PolicyProvisioner::new(
        pool.clone(),
        PolicyCatalog::platform(),
        options().without_seeds(),
    )
    .run()
    .await;

    match result {
        Err(ProvisionError::Statement { purpose, .. }) => {
            assert!(purpose.contains("tenant_isolation_users"), "{purpose}")
        }
        other => panic!("expected a fatal statement error, got {other:?}"),
    }
    // No exception policy went in without the isolation policy.
    assert_eq!(policy_count(&pool).await, 0);

    drop_schema(&pool, &schema).await;
}

/// Vector settings that need no pgvector: `plpgsql` is always installed.
fn vector_without_pgvector() -> VectorOptions {
    VectorOptions {
        extension: "plpgsql".to_string(),
        dimensions: 3,
        index_lists: 1,
        ..VectorOptions::default()
    }
}

async fn column_type(pool: &PgPool, table: &str, column: &str) -> Option<String> {
    sqlx::query_scalar(citadel_policy::ddl::COLUMN_UDT)
        .bind(table)
        .bind(column)
        .fetch_optional(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_vector_bootstrap_skips_absent_or_foreign_column() {
    let Some((pool, schema)) = scratch_pool().await else {
        return;
    };
    let _serial = SERIAL.lock().await;
    pool.execute(SCHEMA).await.unwrap();
    let options = options().without_seeds().with_vector(vector_without_pgvector());

    let report = PolicyProvisioner::new(pool.clone(), PolicyCatalog::platform(), options.clone())
        .run()
        .await
        .unwrap();
    assert!(report.skipped.iter().any(|s| s == "knowledge_chunks.embedding"));
    assert!(!report.vector_column_converted);

    // A column of a type that is neither an array nor a vector is left alone.
    pool.execute(
        "CREATE TABLE knowledge_chunks (\
             id uuid PRIMARY KEY DEFAULT gen_random_uuid(), \
             tenant_id uuid NOT NULL REFERENCES tenants(id), \
             embedding text)",
    )
    .await
    .unwrap();

    let report = PolicyProvisioner::new(pool.clone(), PolicyCatalog::platform(), options)
        .run()
        .await
        .unwrap();
    assert!(report.skipped.iter().any(|s| s == "knowledge_chunks.embedding"));
    assert!(!report.vector_column_converted);
    assert_eq!(
        column_type(&pool, "knowledge_chunks", "embedding").await.as_deref(),
        Some("text")
    );

    drop_schema(&pool, &schema).await;
}

#[tokio::test]
async fn test_vector_column_converted_once_and_indexed() {
    let Some((pool, schema)) = scratch_pool().await else {
        return;
    };
    let _serial = SERIAL.lock().await;
    let available: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM pg_available_extensions WHERE name = 'vector')",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    if !available {
        drop_schema(&pool, &schema).await;
        return;
    }

    pool.execute(SCHEMA).await.unwrap();
    let vector = VectorOptions {
        dimensions: 3,
        index_lists: 1,
        ..VectorOptions::default()
    };
    // A stale index under the ANN index's name must be replaced after conversion.
    pool.execute(
        format!(
            "CREATE TABLE knowledge_chunks (\
                 id uuid PRIMARY KEY DEFAULT gen_random_uuid(), \
                 tenant_id uuid NOT NULL REFERENCES tenants(id), \
                 embedding real[]); \
             CREATE INDEX {} ON knowledge_chunks (id)",
            vector.index_name
        )
        .as_str(),
    )
    .await
    .unwrap();

    let provisioner = PolicyProvisioner::new(
        pool.clone(),
        PolicyCatalog::platform(),
        options().without_seeds().with_vector(vector.clone()),
    );

    let first = provisioner.run().await.unwrap();
    assert!(first.vector_column_converted);
    assert_eq!(
        column_type(&pool, "knowledge_chunks", "embedding").await.as_deref(),
        Some("vector")
    );

    let index_def = || {
        let pool = pool.clone();
        let name = vector.index_name.clone();
        async move {
            sqlx::query_scalar::<_, String>(
                "SELECT indexdef FROM pg_indexes \
                 WHERE schemaname = current_schema() AND indexname = $1",
            )
            .bind(name)
            .fetch_all(&pool)
            .await
            .unwrap()
        }
    };
    let defs = index_def().await;
    assert_eq!(defs.len(), 1);
    assert!(defs[0].contains("ivfflat"), "{}", defs[0]);

    let second = provisioner.run().await.unwrap();
    assert!(!second.vector_column_converted);
    assert!(second.is_noop());
    assert_eq!(index_def().await, defs);

    drop_schema(&pool, &schema).await;
}
