//! Engine configuration
//!
//! # Environment Variables
//!
//! - `FORMATION_JOBS` - Override the number of worker threads
//! - `FORMATION_HALT_ON_ERROR` - Stop issuing new work after the first failure

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Environment variable for the worker count override
pub const ENV_JOBS: &str = "FORMATION_JOBS";

/// Environment variable for the halt-on-error override
pub const ENV_HALT_ON_ERROR: &str = "FORMATION_HALT_ON_ERROR";

/// Settings shared by the diff and reconcile schedulers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of worker threads
    pub jobs: usize,
    /// Cancel the run on the first node failure
    pub halt_on_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            jobs: 4,
            halt_on_error: false,
        }
    }
}

impl EngineConfig {
    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by variable name
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(jobs) = var(ENV_JOBS) {
            self.jobs = jobs
                .trim()
                .parse()
                .with_context(|| format!("{ENV_JOBS} must be a number, got {jobs:?}"))?;
            log::debug!("Using {} jobs from {ENV_JOBS}", self.jobs);
        }
        if let Some(halt) = var(ENV_HALT_ON_ERROR) {
            self.halt_on_error = match halt.trim() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                other => anyhow::bail!("{ENV_HALT_ON_ERROR} must be a boolean, got {other:?}"),
            };
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings the schedulers cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.jobs == 0 {
            return Err(crate::Error::Config("jobs must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.jobs, 4);
        assert!(!config.halt_on_error);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formation.toml");
        fs::write(&path, "jobs = 8\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.jobs, 8);
        assert!(!config.halt_on_error);
    }

    #[test]
    fn test_load_rejects_zero_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formation.toml");
        fs::write(&path, "jobs = 0\nhalt_on_error = true\n").unwrap();

        let err = EngineConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("jobs must be at least 1"));
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = EngineConfig::load(Path::new("/nonexistent/formation.toml")).unwrap_err();
        assert!(err.to_string().contains("Could not read"));
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::default()
            .with_overrides(vars(&[(ENV_JOBS, "2"), (ENV_HALT_ON_ERROR, "true")]))
            .unwrap();
        assert_eq!(config.jobs, 2);
        assert!(config.halt_on_error);

        assert!(EngineConfig::default()
            .with_overrides(vars(&[(ENV_JOBS, "many")]))
            .is_err());
        assert!(EngineConfig::default()
            .with_overrides(vars(&[(ENV_HALT_ON_ERROR, "maybe")]))
            .is_err());
    }
}
