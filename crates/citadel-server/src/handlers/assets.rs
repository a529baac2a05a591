//! Asset endpoints.

use crate::error::{ApiError, ApiResult};
use crate::middleware::TenantTx;
use axum::{extract::Path, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ASSET_COLUMNS: &str = "id, tenant_id, folder_id, name, content_type, size_bytes, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Asset {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAsset {
    pub name: String,
    #[serde(default)]
    pub folder_id: Option<Uuid>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: i64,
}

/// Row-level security limits the result to the bound tenant.
pub async fn list_assets(tx: TenantTx) -> ApiResult<Json<Vec<Asset>>> {
    let mut conn = tx.conn().await?;
    let assets = sqlx::query_as::<_, Asset>(&format!(
        "SELECT {ASSET_COLUMNS} FROM assets ORDER BY created_at, id"
    ))
    .fetch_all(&mut *conn)
    .await?;
    Ok(Json(assets))
}

pub async fn get_asset(tx: TenantTx, Path(id): Path<Uuid>) -> ApiResult<Json<Asset>> {
    let mut conn = tx.conn().await?;
    sqlx::query_as::<_, Asset>(&format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Asset".into()))
}

pub async fn create_asset(
    tx: TenantTx,
    Json(body): Json<CreateAsset>,
) -> ApiResult<(StatusCode, Json<Asset>)> {
    let tenant_id = tx.tenant_id().ok_or(ApiError::TenantRequired)?;
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    if body.size_bytes < 0 {
        return Err(ApiError::BadRequest("size_bytes must not be negative".into()));
    }

    let mut conn = tx.conn().await?;
    let asset = sqlx::query_as::<_, Asset>(&format!(
        "INSERT INTO assets (tenant_id, folder_id, name, content_type, size_bytes) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {ASSET_COLUMNS}"
    ))
    .bind(tenant_id.as_uuid())
    .bind(body.folder_id)
    .bind(name)
    .bind(&body.content_type)
    .bind(body.size_bytes)
    .fetch_one(&mut *conn)
    .await?;

    Ok((StatusCode::CREATED, Json(asset)))
}
