//! Environment variable handling.

use crate::mode::DeploymentMode;
use std::env;
use thiserror::Error;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("failed to load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

/// Environment variable names.
pub mod vars {
    // Deployment
    pub const CITADEL_ENV: &str = "CITADEL_ENV";
    pub const NODE_ENV: &str = "NODE_ENV";

    // Configuration
    pub const CONFIG_PATH: &str = "CONFIG_PATH";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const ADMIN_DATABASE_URL: &str = "ADMIN_DATABASE_URL";
}

/// Process environment.
pub struct Environment;

impl Environment {
    /// Load `.env`, `.env.local`, then `.env.<mode>`.
    ///
    /// Files are optional. Variables already present in the process win.
    pub fn init() -> Result<(), EnvError> {
        for file in [".env".to_string(), ".env.local".to_string()]
            .into_iter()
            .chain(Self::raw_mode().map(|mode| format!(".env.{mode}")))
        {
            match dotenvy::from_filename(&file) {
                Ok(_) => {}
                Err(e) if e.not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Non-empty value of a variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok().filter(|v| !v.trim().is_empty())
    }

    fn raw_mode() -> Option<String> {
        Self::get(vars::CITADEL_ENV).or_else(|| Self::get(vars::NODE_ENV))
    }

    /// Resolve the deployment mode.
    ///
    /// `CITADEL_ENV` wins over `NODE_ENV`. Unset means development; an
    /// unrecognised value is an error.
    pub fn deployment_mode() -> Result<DeploymentMode, EnvError> {
        match Self::raw_mode() {
            None => Ok(DeploymentMode::Development),
            Some(raw) => raw.parse().map_err(|_| EnvError::InvalidValue {
                var: vars::CITADEL_ENV.to_string(),
                message: format!("unknown deployment mode '{raw}'"),
            }),
        }
    }
}
