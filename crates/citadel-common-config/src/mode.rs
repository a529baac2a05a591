//! Deployment mode.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where the process is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Development,
    Test,
    Staging,
    Production,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Only development provisions policies on startup.
    pub fn provisions_on_startup(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl Default for DeploymentMode {
    fn default() -> Self {
        Self::Development
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown deployment mode string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown deployment mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for DeploymentMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_development_provisions() {
        assert!(DeploymentMode::Development.provisions_on_startup());
        assert!(!DeploymentMode::Test.provisions_on_startup());
        assert!(!DeploymentMode::Staging.provisions_on_startup());
        assert!(!DeploymentMode::Production.provisions_on_startup());
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("dev".parse::<DeploymentMode>().unwrap(), DeploymentMode::Development);
        assert_eq!(" PROD ".parse::<DeploymentMode>().unwrap(), DeploymentMode::Production);
        assert!("qa".parse::<DeploymentMode>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&DeploymentMode::Staging).unwrap();
        assert_eq!(json, "\"staging\"");
    }
}
