//! Configuration type definitions
//!
//! Every section carries serde defaults, so an empty YAML document yields a
//! working configuration with local backends enabled and the reference poll
//! policy (5 s interval).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::backends::BackendDescriptor;
use crate::core_types::{BackendKind, Language};
use crate::errors::RunlaneError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunlaneConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Extra time a synchronous adapter gets to release its handles once
    /// the budget has expired.
    #[serde(default = "default_cleanup_grace_ms")]
    pub cleanup_grace_ms: u64,
    /// Route requests for unwired wasm/batch-cluster backends to the local
    /// backend instead of reporting NOT_IMPLEMENTED.
    #[serde(default = "default_true")]
    pub unwired_fallback_to_local: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cleanup_grace_ms: default_cleanup_grace_ms(),
            unwired_fallback_to_local: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides the backend's built-in ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_single_run_ms: Option<u64>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_single_run_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub microsandbox: BackendSettings,
    #[serde(default)]
    pub local_vm: BackendSettings,
    #[serde(default)]
    pub local_process: BackendSettings,
    #[serde(default)]
    pub wasm_sandbox: BackendSettings,
    #[serde(default)]
    pub batch_cluster: BackendSettings,
}

impl BackendsConfig {
    pub fn settings(&self, kind: BackendKind) -> &BackendSettings {
        match kind {
            BackendKind::Microsandbox => &self.microsandbox,
            BackendKind::LocalVm => &self.local_vm,
            BackendKind::LocalProcess => &self.local_process,
            BackendKind::WasmSandbox => &self.wasm_sandbox,
            BackendKind::BatchCluster => &self.batch_cluster,
        }
    }

    pub fn settings_mut(&mut self, kind: BackendKind) -> &mut BackendSettings {
        match kind {
            BackendKind::Microsandbox => &mut self.microsandbox,
            BackendKind::LocalVm => &mut self.local_vm,
            BackendKind::LocalProcess => &mut self.local_process,
            BackendKind::WasmSandbox => &mut self.wasm_sandbox,
            BackendKind::BatchCluster => &mut self.batch_cluster,
        }
    }

    pub fn is_enabled(&self, kind: BackendKind) -> bool {
        self.settings(kind).enabled
    }

    /// Built-in descriptor with the configured ceiling applied.
    pub fn descriptor(&self, kind: BackendKind) -> BackendDescriptor {
        let descriptor = BackendDescriptor::defaults_for(kind);
        match self.settings(kind).max_single_run_ms {
            Some(max) => descriptor.with_max_single_run_ms(max),
            None => descriptor,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Root for per-run scratch directories; the system temp dir when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    #[serde(default)]
    pub runtimes: LocalRuntimes,
}

/// Interpreter command line per language. The script path is appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalRuntimes {
    #[serde(default = "default_python_runtime")]
    pub python: Vec<String>,
    #[serde(default = "default_bash_runtime")]
    pub bash: Vec<String>,
    #[serde(default = "default_javascript_runtime")]
    pub javascript: Vec<String>,
    #[serde(default = "default_typescript_runtime")]
    pub typescript: Vec<String>,
}

impl Default for LocalRuntimes {
    fn default() -> Self {
        Self {
            python: default_python_runtime(),
            bash: default_bash_runtime(),
            javascript: default_javascript_runtime(),
            typescript: default_typescript_runtime(),
        }
    }
}

impl LocalRuntimes {
    pub fn command_for(&self, language: &Language) -> Option<&[String]> {
        let command = match language {
            Language::Python => &self.python,
            Language::Bash => &self.bash,
            Language::JavaScript => &self.javascript,
            Language::TypeScript => &self.typescript,
            Language::Other(_) => return None,
        };
        Some(command.as_slice())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<log::LevelFilter, RunlaneError> {
        log::LevelFilter::from_str(&self.level).map_err(|_| {
            RunlaneError::ConfigError(format!("Unknown log level '{}'", self.level))
        })
    }
}

impl RunlaneConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RunlaneError> {
        if self.lifecycle.poll_interval_ms == 0 {
            return Err(RunlaneError::ConfigError(
                "lifecycle.poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.defaults.timeout_ms == 0 {
            return Err(RunlaneError::ConfigError(
                "defaults.timeout_ms must be greater than 0".to_string(),
            ));
        }

        for kind in BackendKind::ALL {
            if self.backends.settings(kind).max_single_run_ms == Some(0) {
                return Err(RunlaneError::ConfigError(format!(
                    "backends.{}.max_single_run_ms must be greater than 0",
                    kind
                )));
            }
        }

        let runtimes = [
            ("python", &self.local.runtimes.python),
            ("bash", &self.local.runtimes.bash),
            ("javascript", &self.local.runtimes.javascript),
            ("typescript", &self.local.runtimes.typescript),
        ];
        for (name, command) in runtimes {
            if command.is_empty() || command[0].trim().is_empty() {
                return Err(RunlaneError::ConfigError(format!(
                    "local.runtimes.{} cannot be empty",
                    name
                )));
            }
        }

        self.logging.level_filter()?;

        Ok(())
    }
}

fn default_true() -> bool { true }
fn default_timeout_ms() -> u64 { 30_000 }
fn default_poll_interval_ms() -> u64 { 5_000 }
fn default_cleanup_grace_ms() -> u64 { 2_000 }
fn default_log_level() -> String { "info".to_string() }
fn default_python_runtime() -> Vec<String> { vec!["python3".to_string()] }
fn default_bash_runtime() -> Vec<String> { vec!["bash".to_string()] }
fn default_javascript_runtime() -> Vec<String> { vec!["node".to_string()] }
fn default_typescript_runtime() -> Vec<String> {
    vec!["node".to_string(), "--experimental-strip-types".to_string()]
}
