//! Deployment environment

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;

/// Deployment environment. Picks the `{environment}.toml` overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

const NAMES: [(&str, Environment); 7] = [
    ("development", Environment::Development),
    ("dev", Environment::Development),
    ("test", Environment::Test),
    ("staging", Environment::Staging),
    ("stage", Environment::Staging),
    ("production", Environment::Production),
    ("prod", Environment::Production),
];

impl Environment {
    pub const ENV_VAR: &'static str = "WARDEN_APP_ENV";

    /// Unset or unknown values fall back to `Development`.
    pub fn from_env() -> Self {
        std::env::var(Self::ENV_VAR)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Deployed environments run several warden processes against one
    /// database, so their leases must live in a shared store.
    pub fn is_deployed(&self) -> bool {
        matches!(self, Environment::Staging | Environment::Production)
    }

    pub fn overlay_file(&self) -> String {
        format!("{}.toml", self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, env)| *env)
            .ok_or_else(|| {
                ConfigError::EnvVarError(format!(
                    "{} '{}' is not one of development, test, staging, production",
                    Self::ENV_VAR,
                    s
                ))
            })
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
