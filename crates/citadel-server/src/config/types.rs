//! Server configuration types.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server binding configuration.
    pub server: ServerBindConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Row-level security provisioning.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

impl ServerConfig {
    /// Load from defaults, `CONFIG_PATH` and `CITADEL__*` variables.
    pub fn from_env() -> anyhow::Result<Self> {
        super::loader::load_config()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.server.socket_addr()
    }
}

/// Server binding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerBindConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whole-request timeout, including the commit.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

impl ServerBindConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// URL of the application login.
    pub url: String,
    /// URL of the elevated login used for provisioning and the audit trail.
    /// Falls back to `url`.
    #[serde(default)]
    pub admin_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_admin_max_connections")]
    pub admin_max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Role assumed with `SET LOCAL ROLE` inside every scoped transaction.
    #[serde(default)]
    pub app_role: Option<String>,
    /// Transaction-local setting that carries the tenant.
    #[serde(default = "default_tenant_setting")]
    pub tenant_setting: String,
    /// Run embedded migrations at startup.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_admin_max_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_tenant_setting() -> String {
    citadel_policy::TenantContext::DEFAULT_SETTING.to_string()
}

fn default_true() -> bool {
    true
}

impl DatabaseConfig {
    pub fn admin_url(&self) -> &str {
        self.admin_url.as_deref().unwrap_or(&self.url)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for access tokens.
    pub jwt_secret: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: i64,
}

fn default_access_token_expiry() -> i64 {
    3600
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

/// When provisioning runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningMode {
    /// Follow the deployment mode: development only.
    #[default]
    Auto,
    Always,
    Never,
}

/// Row-level security provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    #[serde(default)]
    pub enabled: ProvisioningMode,
    /// Role granted DML on every catalogued table. Defaults to
    /// `database.app_role`.
    #[serde(default)]
    pub app_role: Option<String>,
    #[serde(default = "default_true")]
    pub seed_reference_data: bool,
    #[serde(default)]
    pub vector: VectorConfig,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            enabled: ProvisioningMode::Auto,
            app_role: None,
            seed_reference_data: true,
            vector: VectorConfig::default(),
        }
    }
}

/// Similarity search bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dimensions")]
    pub dimensions: u32,
    #[serde(default = "default_index_lists")]
    pub index_lists: u32,
}

fn default_dimensions() -> u32 {
    1536
}

fn default_index_lists() -> u32 {
    100
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dimensions: default_dimensions(),
            index_lists: default_index_lists(),
        }
    }
}

impl ProvisioningConfig {
    /// Whether a run happens under the given deployment mode.
    ///
    /// Production never provisions at startup, whatever the override says.
    pub fn should_run(&self, mode: citadel_common_config::DeploymentMode) -> bool {
        match self.enabled {
            ProvisioningMode::Auto => mode.provisions_on_startup(),
            ProvisioningMode::Always => mode != citadel_common_config::DeploymentMode::Production,
            ProvisioningMode::Never => false,
        }
    }

    pub fn options(&self, database: &DatabaseConfig) -> citadel_policy::ProvisionOptions {
        let mut options = citadel_policy::ProvisionOptions {
            tenant_setting: database.tenant_setting.clone(),
            app_role: self.app_role.clone().or_else(|| database.app_role.clone()),
            vector: None,
            seed_reference_data: self.seed_reference_data,
        };
        if self.vector.enabled {
            options = options.with_vector(citadel_policy::VectorOptions {
                dimensions: self.vector.dimensions,
                index_lists: self.vector.index_lists,
                ..citadel_policy::VectorOptions::default()
            });
        }
        options
    }
}
