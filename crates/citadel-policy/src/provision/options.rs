//! Provisioning options.

use crate::ddl::TenantContext;
use serde::{Deserialize, Serialize};

/// Similarity search bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorOptions {
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_vector_table")]
    pub table: String,
    #[serde(default = "default_vector_column")]
    pub column: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: u32,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default = "default_index_lists")]
    pub index_lists: u32,
}

fn default_extension() -> String {
    "vector".to_string()
}

fn default_vector_table() -> String {
    "knowledge_chunks".to_string()
}

fn default_vector_column() -> String {
    "embedding".to_string()
}

fn default_dimensions() -> u32 {
    1536
}

fn default_index_name() -> String {
    "knowledge_chunks_embedding_ivfflat_idx".to_string()
}

fn default_index_lists() -> u32 {
    100
}

impl Default for VectorOptions {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            table: default_vector_table(),
            column: default_vector_column(),
            dimensions: default_dimensions(),
            index_name: default_index_name(),
            index_lists: default_index_lists(),
        }
    }
}

/// What a provisioning run installs besides the catalog's policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionOptions {
    #[serde(default = "default_setting")]
    pub tenant_setting: String,
    /// Role granted DML on catalogued tables; created `NOLOGIN` if missing.
    #[serde(default)]
    pub app_role: Option<String>,
    /// `None` skips the extension, column conversion and index.
    #[serde(default)]
    pub vector: Option<VectorOptions>,
    #[serde(default = "default_true")]
    pub seed_reference_data: bool,
}

fn default_setting() -> String {
    TenantContext::DEFAULT_SETTING.to_string()
}

fn default_true() -> bool {
    true
}

impl ProvisionOptions {
    pub fn tenant_context(&self) -> TenantContext {
        TenantContext::new(self.tenant_setting.clone())
    }

    pub fn with_app_role(mut self, role: impl Into<String>) -> Self {
        self.app_role = Some(role.into());
        self
    }

    pub fn with_vector(mut self, vector: VectorOptions) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn without_seeds(mut self) -> Self {
        self.seed_reference_data = false;
        self
    }
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            tenant_setting: default_setting(),
            app_role: None,
            vector: Some(VectorOptions::default()),
            seed_reference_data: true,
        }
    }
}
