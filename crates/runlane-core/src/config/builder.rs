//! Fluent builder for constructing configurations programmatically

use crate::config::types::*;
use crate::core_types::BackendKind;
use crate::errors::RunlaneError;
use std::path::PathBuf;

/// Builder for creating runlane configurations
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: RunlaneConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.defaults.timeout_ms = timeout_ms;
        self
    }

    pub fn poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.config.lifecycle.poll_interval_ms = interval_ms;
        self
    }

    pub fn cleanup_grace_ms(mut self, grace_ms: u64) -> Self {
        self.config.orchestrator.cleanup_grace_ms = grace_ms;
        self
    }

    pub fn unwired_fallback_to_local(mut self, enabled: bool) -> Self {
        self.config.orchestrator.unwired_fallback_to_local = enabled;
        self
    }

    pub fn enable_backend(mut self, kind: BackendKind) -> Self {
        self.config.backends.settings_mut(kind).enabled = true;
        self
    }

    pub fn disable_backend(mut self, kind: BackendKind) -> Self {
        self.config.backends.settings_mut(kind).enabled = false;
        self
    }

    pub fn max_single_run_ms(mut self, kind: BackendKind, max_ms: u64) -> Self {
        self.config.backends.settings_mut(kind).max_single_run_ms = Some(max_ms);
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.local.work_dir = Some(dir.into());
        self
    }

    pub fn runtimes(mut self, runtimes: LocalRuntimes) -> Self {
        self.config.local.runtimes = runtimes;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<RunlaneConfig, RunlaneError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build without validation
    pub fn build_unchecked(self) -> RunlaneConfig {
        self.config
    }
}
