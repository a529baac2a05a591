//! Workflow template endpoints.

use crate::error::ApiResult;
use crate::middleware::TenantTx;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkflowTemplate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub visibility: String,
    pub allowed_tenants: Vec<Uuid>,
    pub updated_at: DateTime<Utc>,
}

/// Own templates plus published ones shared publicly or with this tenant.
pub async fn list_workflow_templates(tx: TenantTx) -> ApiResult<Json<Vec<WorkflowTemplate>>> {
    let mut conn = tx.conn().await?;
    let templates = sqlx::query_as::<_, WorkflowTemplate>(
        "SELECT id, tenant_id, name, description, status, visibility, allowed_tenants, updated_at \
         FROM workflow_templates WHERE deleted_at IS NULL ORDER BY name, id",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(Json(templates))
}
