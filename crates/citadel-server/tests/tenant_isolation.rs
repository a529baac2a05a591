//! End-to-end tenant isolation against a live PostgreSQL.
//!
//! Set `CITADEL_TEST_DATABASE_URL` to a superuser URL to run these; without it
//! they return immediately. Each test migrates and provisions its own schema
//! and reaches the data through a non-superuser role, so row-level security
//! is in force exactly as in a deployment.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::post,
    Router,
};
use citadel_common_config::DeploymentMode;
use citadel_common_core::{Principal, Role, TenantId, UserId};
use citadel_server::{
    config::{
        AuthConfig, DatabaseConfig, LoggingConfig, ProvisioningConfig, ServerBindConfig,
        ServerConfig, VectorConfig,
    },
    db::{run_migrations, with_tenant_scope, TenantScope},
    middleware::{auth::encode_token, auth::Claims, TenantScopeLayer, TenantTx},
    routes::create_router,
    ApiError, ApiResult, AppState,
};
use once_cell::sync::Lazy;
use std::time::Duration;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tower::ServiceExt;
use tower_http::timeout::TimeoutLayer;
use uuid::Uuid;

const SECRET: &str = "integration_secret_that_is_32_chars";
const APP_ROLE: &str = "citadel_server_test_app";

const TENANT_A: &str = "11111111-1111-1111-1111-111111111111";
const TENANT_B: &str = "22222222-2222-2222-2222-222222222222";
const TENANT_C: &str = "33333333-3333-3333-3333-333333333333";

// Grants to a shared role race when issued from parallel tests.
static SETUP: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

fn tenant(id: &str) -> TenantId {
    TenantId::parse(id).unwrap()
}

struct Harness {
    url: String,
    schema: String,
    /// Superuser pool; bypasses row-level security. Fixtures only.
    admin: PgPool,
    state: AppState,
    app: Router,
}

impl Harness {
    async fn start() -> Option<Self> {
        let url = std::env::var("CITADEL_TEST_DATABASE_URL").ok()?;
        let _setup = SETUP.lock().await;

        let schema = format!("citadel_server_{}", Uuid::new_v4().simple());
        let bootstrap = PgPoolOptions::new().max_connections(1).connect(&url).await.unwrap();
        bootstrap
            .execute(format!("CREATE SCHEMA {schema}").as_str())
            .await
            .unwrap();
        bootstrap.close().await;

        let admin = scratch_pool(&url, &schema, 4).await;
        run_migrations(&admin).await.unwrap();

        let config = test_config(&url);
        let state = AppState::from_pools(config.clone(), admin.clone(), admin.clone()).unwrap();
        let report = citadel_server::provision(&config, &state, DeploymentMode::Development)
            .await
            .unwrap()
            .expect("development always provisions");
        assert!(report.policies_created > 0);

        let usage: bool = sqlx::query_scalar(&format!(
            "SELECT has_schema_privilege('{APP_ROLE}', current_schema(), 'USAGE')"
        ))
        .fetch_one(&admin)
        .await
        .unwrap();
        assert!(usage, "provisioning grants the scratch schema");
        for (id, name) in [(TENANT_A, "Tenant A"), (TENANT_B, "Tenant B"), (TENANT_C, "Tenant C")] {
            sqlx::query("INSERT INTO tenants (id, name) VALUES ($1, $2)")
                .bind(Uuid::parse_str(id).unwrap())
                .bind(name)
                .execute(&admin)
                .await
                .unwrap();
        }

        Some(Self {
            url,
            schema,
            admin,
            app: create_router(state.clone()),
            state,
        })
    }

    async fn finish(self) {
        self.admin
            .execute(format!("DROP SCHEMA {} CASCADE", self.schema).as_str())
            .await
            .unwrap();
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        principal: &Principal,
        body: Option<Value>,
        access_session: Option<&str>,
    ) -> (StatusCode, Value) {
        send(&self.app, method, uri, principal, body, access_session).await
    }

    async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(&self.admin).await.unwrap()
    }
}

async fn scratch_pool(url: &str, schema: &str, max_connections: u32) -> PgPool {
    let search_path = schema.to_string();
    PgPoolOptions::new()
        .max_connections(max_connections)
        .after_connect(move |conn, _meta| {
            let sql = format!("SET search_path TO {search_path}, public");
            Box::pin(async move {
                conn.execute(sql.as_str()).await?;
                Ok(())
            })
        })
        .connect(url)
        .await
        .unwrap()
}

fn test_config(url: &str) -> ServerConfig {
    ServerConfig {
        server: ServerBindConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            body_limit_bytes: 1024 * 1024,
        },
        database: DatabaseConfig {
            url: url.to_string(),
            admin_url: None,
            max_connections: 4,
            min_connections: 0,
            admin_max_connections: 2,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 60,
            app_role: Some(APP_ROLE.to_string()),
            tenant_setting: "app.current_tenant".to_string(),
            run_migrations: true,
        },
        auth: AuthConfig {
            jwt_secret: SECRET.to_string(),
            access_token_expiry_secs: 3600,
        },
        logging: LoggingConfig::default(),
        provisioning: ProvisioningConfig {
            vector: VectorConfig {
                enabled: false,
                ..VectorConfig::default()
            },
            ..ProvisioningConfig::default()
        },
    }
}

fn member_of(tenant_id: &str) -> Principal {
    Principal::tenant(UserId::new(), tenant(tenant_id), Role::Member)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    principal: &Principal,
    body: Option<Value>,
    access_session: Option<&str>,
) -> (StatusCode, Value) {
    let token = encode_token(&Claims::new_access(principal, 300), SECRET).unwrap();
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"));
    if let Some(session) = access_session {
        builder = builder.header("X-Access-Session", session);
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_assets_are_confined_to_their_tenant() {
    let Some(h) = Harness::start().await else {
        return;
    };
    let alice = member_of(TENANT_A);
    let bob = member_of(TENANT_B);

    let (status, created) = h
        .send("POST", "/api/v1/assets", &alice, Some(json!({ "name": "report.pdf" })), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["tenant_id"], TENANT_A);

    let (status, seen_by_b) = h.send("GET", "/api/v1/assets", &bob, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seen_by_b, json!([]));

    let (_, seen_by_a) = h.send("GET", "/api/v1/assets", &alice, None, None).await;
    let assets = seen_by_a.as_array().unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0]["name"], "report.pdf");

    // Another tenant's row by id is indistinguishable from a missing one.
    let id = created["id"].as_str().unwrap();
    let (status, _) = h
        .send("GET", &format!("/api/v1/assets/{id}"), &bob, None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.finish().await;
}

#[tokio::test]
async fn test_tenantless_access_is_limited_to_auth_exceptions() {
    let Some(h) = Harness::start().await else {
        return;
    };
    sqlx::query("INSERT INTO assets (tenant_id, name) VALUES ($1, 'secret.txt')")
        .bind(Uuid::parse_str(TENANT_A).unwrap())
        .execute(&h.admin)
        .await
        .unwrap();
    sqlx::query("INSERT INTO users (tenant_id, email) VALUES ($1, 'alice@a.test')")
        .bind(Uuid::parse_str(TENANT_A).unwrap())
        .execute(&h.admin)
        .await
        .unwrap();

    // The guard turns away tenant-less members before any transaction opens.
    let stray = Principal::global(UserId::new(), Role::Member);
    let (status, body) = h.send("GET", "/api/v1/assets", &stray, None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "tenant_required");

    // A platform admin passes the guard but the policies show nothing.
    let operator = Principal::global(UserId::new(), Role::PlatformAdmin);
    let (status, body) = h.send("GET", "/api/v1/assets", &operator, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let mut tx = h.state.scope.begin(&h.state.pool, None).await.unwrap();
    let visible: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM assets")
        .fetch_one(&mut *tx)
        .await
        .unwrap();
    assert_eq!(visible, 0);

    let updated = sqlx::query("UPDATE assets SET name = 'renamed'")
        .execute(&mut *tx)
        .await
        .unwrap();
    assert_eq!(updated.rows_affected(), 0);

    // Login lookup by email is one of the named exceptions.
    let login: Option<String> =
        sqlx::query_scalar("SELECT email FROM users WHERE email = 'alice@a.test'")
            .fetch_optional(&mut *tx)
            .await
            .unwrap();
    assert_eq!(login.as_deref(), Some("alice@a.test"));

    let insert = sqlx::query("INSERT INTO assets (tenant_id, name) VALUES ($1, 'sneaky')")
        .bind(Uuid::parse_str(TENANT_A).unwrap())
        .execute(&mut *tx)
        .await;
    let err = insert.unwrap_err();
    assert!(matches!(ApiError::from(err), ApiError::Forbidden));
    tx.rollback().await.unwrap();

    assert_eq!(h.count("SELECT COUNT(*) FROM assets WHERE name = 'secret.txt'").await, 1);
    h.finish().await;
}

#[tokio::test]
async fn test_failed_request_rolls_back_every_write() {
    let Some(h) = Harness::start().await else {
        return;
    };

    async fn two_writes_then_fail(tx: TenantTx) -> ApiResult<StatusCode> {
        let tenant_id = tx.tenant_id().ok_or(ApiError::TenantRequired)?;
        let mut conn = tx.conn().await?;
        for name in ["first.txt", "second.txt"] {
            sqlx::query("INSERT INTO assets (tenant_id, name) VALUES ($1, $2)")
                .bind(tenant_id.as_uuid())
                .bind(name)
                .execute(&mut *conn)
                .await?;
        }
        Err(ApiError::BadRequest("validation failed after writing".into()))
    }

    let app = Router::new()
        .route("/fail", post(two_writes_then_fail))
        .layer(TenantScopeLayer::new(h.state.pool.clone(), h.state.scope.clone()))
        .layer(citadel_server::middleware::AuthLayer::new(SECRET));

    let (status, body) = send(&app, "POST", "/fail", &member_of(TENANT_A), None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(h.count("SELECT COUNT(*) FROM assets").await, 0);

    // Same contract for background work.
    let result: Result<(), ApiError> = with_tenant_scope(
        &h.state.pool,
        &h.state.scope,
        tenant(TENANT_B),
        move |conn| {
            Box::pin(async move {
                for name in ["job-1.txt", "job-2.txt"] {
                    sqlx::query("INSERT INTO assets (tenant_id, name) VALUES ($1, $2)")
                        .bind(Uuid::parse_str(TENANT_B).unwrap())
                        .bind(name)
                        .execute(&mut *conn)
                        .await?;
                }
                Err::<(), _>(ApiError::Internal(anyhow::anyhow!("job failed")))
            })
        },
    )
    .await;
    assert!(result.is_err());
    assert_eq!(h.count("SELECT COUNT(*) FROM assets").await, 0);

    h.finish().await;
}

#[tokio::test]
async fn test_timed_out_request_rolls_back() {
    let Some(h) = Harness::start().await else {
        return;
    };

    async fn write_then_stall(tx: TenantTx) -> ApiResult<StatusCode> {
        let tenant_id = tx.tenant_id().ok_or(ApiError::TenantRequired)?;
        let mut conn = tx.conn().await?;
        sqlx::query("INSERT INTO assets (tenant_id, name) VALUES ($1, 'stalled.txt')")
            .bind(tenant_id.as_uuid())
            .execute(&mut *conn)
            .await?;
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(StatusCode::CREATED)
    }

    let app = Router::new()
        .route("/slow", post(write_then_stall))
        .layer(TenantScopeLayer::new(h.state.pool.clone(), h.state.scope.clone()))
        .layer(citadel_server::middleware::AuthLayer::new(SECRET))
        .layer(TimeoutLayer::new(Duration::from_millis(200)));

    let (status, _) = send(&app, "POST", "/slow", &member_of(TENANT_A), None, None).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(h.count("SELECT COUNT(*) FROM assets").await, 0);

    // The abandoned transaction gave its connection back.
    let (status, created) = h
        .send("POST", "/api/v1/assets", &member_of(TENANT_A), Some(json!({ "name": "next.txt" })), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "next.txt");
    assert_eq!(h.count("SELECT COUNT(*) FROM assets").await, 1);

    h.finish().await;
}

#[tokio::test]
async fn test_background_job_commits_under_its_tenant() {
    let Some(h) = Harness::start().await else {
        return;
    };

    let inserted: Uuid = with_tenant_scope(
        &h.state.pool,
        &h.state.scope,
        tenant(TENANT_C),
        move |conn| {
            Box::pin(async move {
                sqlx::query_scalar::<_, Uuid>(
                    "INSERT INTO assets (tenant_id, name) VALUES ($1, 'ingested.pdf') RETURNING id",
                )
                .bind(Uuid::parse_str(TENANT_C).unwrap())
                .fetch_one(&mut *conn)
                .await
            })
        },
    )
    .await
    .unwrap();

    let owner: Uuid = sqlx::query_scalar("SELECT tenant_id FROM assets WHERE id = $1")
        .bind(inserted)
        .fetch_one(&h.admin)
        .await
        .unwrap();
    assert_eq!(owner, Uuid::parse_str(TENANT_C).unwrap());

    // A job bound to one tenant cannot write rows for another.
    let foreign: Result<(), sqlx::Error> = with_tenant_scope(
        &h.state.pool,
        &h.state.scope,
        tenant(TENANT_C),
        move |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO assets (tenant_id, name) VALUES ($1, 'misfiled.pdf')")
                    .bind(Uuid::parse_str(TENANT_A).unwrap())
                    .execute(&mut *conn)
                    .await?;
                Ok::<(), sqlx::Error>(())
            })
        },
    )
    .await;
    assert!(foreign.is_err());
    assert_eq!(h.count("SELECT COUNT(*) FROM assets").await, 1);

    h.finish().await;
}

#[tokio::test]
async fn test_single_connection_never_leaks_tenant() {
    let Some(h) = Harness::start().await else {
        return;
    };
    for (id, name) in [(TENANT_A, "a.txt"), (TENANT_B, "b.txt")] {
        sqlx::query("INSERT INTO assets (tenant_id, name) VALUES ($1, $2)")
            .bind(Uuid::parse_str(id).unwrap())
            .bind(name)
            .execute(&h.admin)
            .await
            .unwrap();
    }

    // One connection forces every transaction through the same session.
    let single = scratch_pool(&h.url, &h.schema, 1).await;
    let scope = TenantScope::new("app.current_tenant", Some(APP_ROLE.to_string())).unwrap();

    let mut tasks = Vec::new();
    for round in 0..20 {
        let pool = single.clone();
        let scope = scope.clone();
        let id = if round % 2 == 0 { TENANT_A } else { TENANT_B };
        tasks.push(tokio::spawn(async move {
            let mut tx = scope.begin(&pool, Some(tenant(id))).await.unwrap();
            tokio::task::yield_now().await;
            let owners: Vec<Uuid> = sqlx::query_scalar("SELECT tenant_id FROM assets")
                .fetch_all(&mut *tx)
                .await
                .unwrap();
            tx.commit().await.unwrap();
            (id, owners)
        }));
    }

    for task in tasks {
        let (id, owners) = task.await.unwrap();
        assert_eq!(owners, vec![Uuid::parse_str(id).unwrap()], "bound to {id}");
    }

    // The binding ended with its transaction.
    let mut tx = scope.begin(&single, None).await.unwrap();
    let setting: Option<String> =
        sqlx::query_scalar("SELECT NULLIF(current_setting('app.current_tenant', true), '')")
            .fetch_one(&mut *tx)
            .await
            .unwrap();
    assert_eq!(setting, None);
    tx.rollback().await.unwrap();

    single.close().await;
    h.finish().await;
}

#[tokio::test]
async fn test_restricted_template_visibility() {
    let Some(h) = Harness::start().await else {
        return;
    };
    let template_id: Uuid = sqlx::query_scalar(
        "INSERT INTO workflow_templates (tenant_id, name, status, visibility, allowed_tenants) \
         VALUES ($1, 'Onboarding', 'published', 'restricted', ARRAY[$2]::uuid[]) RETURNING id",
    )
    .bind(Uuid::parse_str(TENANT_A).unwrap())
    .bind(Uuid::parse_str(TENANT_B).unwrap())
    .fetch_one(&h.admin)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO workflow_template_versions (tenant_id, template_id, version) VALUES ($1, $2, 1)",
    )
    .bind(Uuid::parse_str(TENANT_A).unwrap())
    .bind(template_id)
    .execute(&h.admin)
    .await
    .unwrap();

    let names = |body: Value| -> Vec<String> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect()
    };

    for (id, expected) in [(TENANT_A, 1), (TENANT_B, 1), (TENANT_C, 0)] {
        let (status, body) = h
            .send("GET", "/api/v1/workflow-templates", &member_of(id), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(names(body).len(), expected, "tenant {id}");
    }

    // Versions follow their parent's visibility.
    let versions_for = |id: &'static str| {
        let pool = h.state.pool.clone();
        let scope = h.state.scope.clone();
        async move {
            let mut tx = scope.begin(&pool, Some(tenant(id))).await.unwrap();
            let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflow_template_versions")
                .fetch_one(&mut *tx)
                .await
                .unwrap();
            tx.rollback().await.unwrap();
            n
        }
    };
    assert_eq!(versions_for(TENANT_B).await, 1);
    assert_eq!(versions_for(TENANT_C).await, 0);

    sqlx::query("UPDATE workflow_templates SET status = 'draft' WHERE id = $1")
        .bind(template_id)
        .execute(&h.admin)
        .await
        .unwrap();

    for (id, expected) in [(TENANT_A, 1), (TENANT_B, 0), (TENANT_C, 0)] {
        let (_, body) = h
            .send("GET", "/api/v1/workflow-templates", &member_of(id), None, None)
            .await;
        assert_eq!(names(body).len(), expected, "tenant {id} after unpublishing");
    }
    assert_eq!(versions_for(TENANT_B).await, 0);
    assert_eq!(versions_for(TENANT_A).await, 1);

    h.finish().await;
}

#[tokio::test]
async fn test_access_session_records_mutations() {
    let Some(h) = Harness::start().await else {
        return;
    };
    let operator = Principal::global(UserId::new(), Role::PlatformAdmin);

    let (status, started) = h
        .send(
            "POST",
            "/api/v1/access-sessions",
            &operator,
            Some(json!({ "tenant_id": TENANT_A })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = started["token"].as_str().unwrap().to_string();
    let session_id = started["session"]["id"].as_str().unwrap().to_string();
    assert!(started["session"].get("token_hash").is_none());

    let (status, asset) = h
        .send(
            "POST",
            "/api/v1/assets",
            &operator,
            Some(json!({ "name": "support-fix.txt" })),
            Some(token.as_str()),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(asset["tenant_id"], TENANT_A);

    // Reads are not logged.
    let (status, _) = h
        .send("GET", "/api/v1/assets", &operator, None, Some(token.as_str()))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, log) = h
        .send(
            "GET",
            &format!("/api/v1/access-sessions/{session_id}/mutations"),
            &operator,
            None,
            None,
        )
        .await;
    let log = log.as_array().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0]["method"], "POST");
    assert_eq!(log[0]["path"], "/api/v1/assets");
    assert_eq!(log[0]["status_code"], 201);

    let end_uri = format!("/api/v1/access-sessions/{session_id}/end");
    let (status, ended) = h.send("POST", &end_uri, &operator, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["already_ended"], false);

    let (_, again) = h.send("POST", &end_uri, &operator, None, None).await;
    assert_eq!(again["already_ended"], true);
    assert_eq!(again["session"]["ended_at"], ended["session"]["ended_at"]);

    let (status, body) = h
        .send("GET", "/api/v1/assets", &operator, None, Some(token.as_str()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "access_session_inactive");

    h.finish().await;
}

#[tokio::test]
async fn test_failed_audit_append_rolls_back_mutation() {
    let Some(h) = Harness::start().await else {
        return;
    };
    let operator = Principal::global(UserId::new(), Role::PlatformAdmin);
    let (_, started) = h
        .send(
            "POST",
            "/api/v1/access-sessions",
            &operator,
            Some(json!({ "tenant_id": TENANT_B })),
            None,
        )
        .await;
    let token = started["token"].as_str().unwrap().to_string();

    h.admin
        .execute("ALTER TABLE access_mutation_logs RENAME TO access_mutation_logs_offline")
        .await
        .unwrap();

    let (status, body) = h
        .send(
            "POST",
            "/api/v1/assets",
            &operator,
            Some(json!({ "name": "unaudited.txt" })),
            Some(token.as_str()),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "audit_error");
    assert_eq!(h.count("SELECT COUNT(*) FROM assets").await, 0);

    h.finish().await;
}

#[tokio::test]
async fn test_non_admin_cannot_start_access_session() {
    let Some(h) = Harness::start().await else {
        return;
    };
    let (status, _) = h
        .send(
            "POST",
            "/api/v1/access-sessions",
            &member_of(TENANT_A),
            Some(json!({ "tenant_id": TENANT_B })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let operator = Principal::global(UserId::new(), Role::PlatformAdmin);
    let (status, _) = h
        .send(
            "POST",
            "/api/v1/access-sessions",
            &operator,
            Some(json!({ "tenant_id": Uuid::new_v4().to_string() })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.finish().await;
}
