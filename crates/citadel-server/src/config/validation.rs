//! Configuration validation.

use super::types::ServerConfig;
use citadel_policy::ident;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JWT secret: must be at least 32 characters")]
    InvalidJwtSecret,

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid port: {0}")]
    InvalidPort(u16),

    #[error("Invalid pool size: max_connections must be > 0 and >= min_connections")]
    InvalidPoolSize,

    #[error("Invalid application role: {0}")]
    InvalidAppRole(String),

    #[error("Invalid tenant setting: {0}")]
    InvalidTenantSetting(String),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),

    #[error("Invalid vector dimensions: {0}")]
    InvalidVectorDimensions(u32),
}

/// Validate server configuration, reporting every problem at once.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.auth.jwt_secret.len() < 32 {
        errors.push(ConfigError::InvalidJwtSecret);
    }

    if config.database.url.is_empty() || config.database.admin_url().is_empty() {
        errors.push(ConfigError::InvalidDatabaseUrl);
    }

    if config.server.port == 0 {
        errors.push(ConfigError::InvalidPort(0));
    }

    let db = &config.database;
    if db.max_connections == 0 || db.max_connections < db.min_connections || db.admin_max_connections == 0 {
        errors.push(ConfigError::InvalidPoolSize);
    }

    for role in [&db.app_role, &config.provisioning.app_role].into_iter().flatten() {
        if !ident::is_safe(role) {
            errors.push(ConfigError::InvalidAppRole(role.clone()));
        }
    }

    if ident::checked_setting(&db.tenant_setting).is_err() {
        errors.push(ConfigError::InvalidTenantSetting(db.tenant_setting.clone()));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(ConfigError::InvalidLogLevel(config.logging.level.clone()));
    }

    if !["pretty", "json"].contains(&config.logging.format.to_lowercase().as_str()) {
        errors.push(ConfigError::InvalidLogFormat(config.logging.format.clone()));
    }

    // pgvector's ivfflat index caps dimensions at 2000
    let vector = &config.provisioning.vector;
    if vector.enabled && !(1..=2000).contains(&vector.dimensions) {
        errors.push(ConfigError::InvalidVectorDimensions(vector.dimensions));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
