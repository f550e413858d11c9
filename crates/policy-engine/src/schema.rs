use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deployment environment the gateway runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// Only `production` (any case) selects production; every other value
/// is development.
impl FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("production") {
            Ok(Environment::Production)
        } else {
            Ok(Environment::Development)
        }
    }
}

/// Cross-origin and transport policy section of the gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginPolicy {
    #[serde(default)]
    pub environment: Environment,
    /// Origins trusted in production, compared exactly.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Origin of the first-party frontend; always trusted when set.
    #[serde(default)]
    pub frontend_url: Option<String>,
    /// Paths served over plaintext even in production.
    #[serde(default = "default_health_paths")]
    pub health_paths: Vec<String>,
    /// Read the client's scheme from `X-Forwarded-Proto`.
    #[serde(default = "default_trust_forwarded_proto")]
    pub trust_forwarded_proto: bool,
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            allowed_origins: Vec::new(),
            frontend_url: None,
            health_paths: default_health_paths(),
            trust_forwarded_proto: default_trust_forwarded_proto(),
        }
    }
}

fn default_health_paths() -> Vec<String> {
    vec!["/health".to_string(), "/healthz".to_string()]
}

fn default_trust_forwarded_proto() -> bool {
    true
}
