use std::path::Path;

use anyhow::{Context, Result};

use crate::error::PolicyConfigError;
use crate::matcher::{canonical_origin, frontend_origin};
use crate::schema::OriginPolicy;

/// Load an [`OriginPolicy`] from a YAML file on disk.
pub fn load_policy(path: impl AsRef<Path>) -> Result<OriginPolicy> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policy file: {}", path.display()))?;
    load_policy_from_str(&contents)
        .with_context(|| format!("failed to parse policy file: {}", path.display()))
}

/// Parse and validate an [`OriginPolicy`] from a YAML string.
pub fn load_policy_from_str(yaml: &str) -> Result<OriginPolicy> {
    let policy: OriginPolicy = serde_yml::from_str(yaml).context("YAML deserialization failed")?;
    policy.validate()?;
    Ok(policy)
}

impl OriginPolicy {
    /// Post-deserialization checks. Runs again when the engine is built, so
    /// a policy assembled from environment overrides is checked too.
    pub fn validate(&self) -> Result<(), PolicyConfigError> {
        for origin in &self.allowed_origins {
            if origin.trim() == "*" {
                if self.environment.is_production() {
                    return Err(PolicyConfigError::WildcardInProduction);
                }
                continue;
            }
            canonical_origin(origin)?;
        }

        if let Some(frontend) = &self.frontend_url {
            frontend_origin(frontend)?;
        }

        for path in &self.health_paths {
            if !path.starts_with('/') {
                return Err(PolicyConfigError::InvalidHealthPath(path.clone()));
            }
        }

        Ok(())
    }
}
