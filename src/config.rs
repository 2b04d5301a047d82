//! Engine configuration.
//!
//! Loaded from YAML or from environment variables:
//!   CLASSIFICATION_PRIVILEGED_ROLES      comma-separated roles (default: admin)
//!   CLASSIFICATION_CASCADE_MAX_ATTEMPTS  attempts per mapping in the attribute cascade (default: 3)
//!   CLASSIFICATION_HIDE_INACTIVE_NODES   drop inherited mappings of inactive categories (default: true)

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{ClassificationError, Result};

pub const ENV_PRIVILEGED_ROLES: &str = "CLASSIFICATION_PRIVILEGED_ROLES";
pub const ENV_CASCADE_MAX_ATTEMPTS: &str = "CLASSIFICATION_CASCADE_MAX_ATTEMPTS";
pub const ENV_HIDE_INACTIVE_NODES: &str = "CLASSIFICATION_HIDE_INACTIVE_NODES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Roles allowed to extend CLOSED domains and add NORMATIVE values.
    pub privileged_roles: Vec<String>,
    /// Attempts per mapping before an attribute-deactivation cascade gives up.
    pub cascade_max_attempts: u32,
    /// When true, an active subcategory does not inherit from an inactive category.
    pub hide_inactive_nodes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            privileged_roles: vec!["admin".into()],
            cascade_max_attempts: 3,
            hide_inactive_nodes: true,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(yaml)
            .map_err(|e| ClassificationError::validation("config", e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        Self::from_yaml_str(&yaml)
    }

    /// Defaults overridden by process environment (after loading `.env` if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the known keys.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(roles) = lookup(ENV_PRIVILEGED_ROLES) {
            cfg.privileged_roles = roles
                .split(',')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
        }
        if let Some(raw) = lookup(ENV_CASCADE_MAX_ATTEMPTS) {
            cfg.cascade_max_attempts = raw.trim().parse().map_err(|_| {
                ClassificationError::validation(
                    ENV_CASCADE_MAX_ATTEMPTS,
                    format!("expected a positive integer, got '{raw}'"),
                )
            })?;
        }
        if let Some(raw) = lookup(ENV_HIDE_INACTIVE_NODES) {
            cfg.hide_inactive_nodes = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ClassificationError::validation(
                        ENV_HIDE_INACTIVE_NODES,
                        format!("expected a boolean, got '{raw}'"),
                    ))
                }
            };
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cascade_max_attempts == 0 {
            return Err(ClassificationError::validation(
                "cascade_max_attempts",
                "must be at least 1",
            ));
        }
        if self.privileged_roles.is_empty() {
            return Err(ClassificationError::validation(
                "privileged_roles",
                "at least one privileged role is required",
            ));
        }
        Ok(())
    }
}
