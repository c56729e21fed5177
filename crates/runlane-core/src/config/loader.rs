//! Configuration loader for YAML files and environment overrides

use crate::config::types::RunlaneConfig;
use crate::errors::RunlaneError;
use std::env;
use std::path::Path;
use tokio::fs;

pub const ENV_POLL_INTERVAL_MS: &str = "RUNLANE_POLL_INTERVAL_MS";
pub const ENV_DEFAULT_TIMEOUT_MS: &str = "RUNLANE_DEFAULT_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "RUNLANE_LOG_LEVEL";

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<RunlaneConfig, RunlaneError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            RunlaneError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        log::debug!("Loaded configuration from {}", path.display());
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(content: &str) -> Result<RunlaneConfig, RunlaneError> {
        let mut config: RunlaneConfig = if content.trim().is_empty() {
            RunlaneConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                RunlaneError::ConfigError(format!("Failed to parse YAML config: {}", e))
            })?
        };

        Self::apply_environment(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_environment() -> Result<RunlaneConfig, RunlaneError> {
        Self::from_yaml_str("")
    }

    fn apply_environment(config: &mut RunlaneConfig) -> Result<(), RunlaneError> {
        if let Some(value) = Self::env_u64(ENV_POLL_INTERVAL_MS)? {
            config.lifecycle.poll_interval_ms = value;
        }

        if let Some(value) = Self::env_u64(ENV_DEFAULT_TIMEOUT_MS)? {
            config.defaults.timeout_ms = value;
        }

        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            if !level.trim().is_empty() {
                config.logging.level = level.trim().to_string();
            }
        }

        Ok(())
    }

    fn env_u64(key: &str) -> Result<Option<u64>, RunlaneError> {
        match env::var(key) {
            Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<u64>().map(Some).map_err(|e| {
                RunlaneError::ConfigError(format!("Invalid value '{}' for {}: {}", raw, key, e))
            }),
            _ => Ok(None),
        }
    }
}
