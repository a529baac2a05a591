//! Configuration loading utilities.

use super::types::ServerConfig;
use anyhow::{Context, Result};
use citadel_common_config::{vars, Environment};
use std::path::Path;
use tracing::info;

/// Layers embedded defaults, an optional file and the environment.
pub struct ConfigLoader {
    config_path: Option<String>,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_prefix: "CITADEL".to_string(),
        }
    }

    pub fn with_config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn load(&self) -> Result<ServerConfig> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            include_str!("defaults.toml"),
            config::FileFormat::Toml,
        ));

        if let Some(path) = &self.config_path {
            if Path::new(path).exists() {
                info!(path = %path, "Loading config file");
                builder = builder.add_source(config::File::with_name(path));
            }
        }

        // CITADEL__DATABASE__URL -> database.url
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        // Plain DATABASE_URL / ADMIN_DATABASE_URL win over everything else.
        if let Some(url) = Environment::get(vars::DATABASE_URL) {
            builder = builder.set_override("database.url", url)?;
        }
        if let Some(url) = Environment::get(vars::ADMIN_DATABASE_URL) {
            builder = builder.set_override("database.admin_url", url)?;
        }

        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load configuration, honouring `CONFIG_PATH`.
pub fn load_config() -> Result<ServerConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = Environment::get(vars::CONFIG_PATH) {
        loader = loader.with_config_path(path);
    }
    loader.load()
}
