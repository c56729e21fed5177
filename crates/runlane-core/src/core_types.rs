//! Request and result types shared by every layer of the dispatcher
//!
//! `ExecutionRequest` is what the workflow engine hands in, `ExecutionResult`
//! is the one canonical shape handed back regardless of which backend ran the
//! code. Both are plain request-scoped values; nothing here is shared across
//! concurrent executions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::errors::ExecutionErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    JavaScript,
    TypeScript,
    Python,
    Bash,
    Other(String),
}

impl Language {
    pub fn as_str(&self) -> &str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Bash => "bash",
            Language::Other(name) => name.as_str(),
        }
    }

    /// File extension used when the source is written to disk.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Language::JavaScript => "js",
            Language::TypeScript => "ts",
            Language::Python => "py",
            Language::Bash => "sh",
            Language::Other(_) => "txt",
        }
    }

    /// js/ts run on the local VM, everything else in a subprocess.
    pub fn is_js_family(&self) -> bool {
        matches!(self, Language::JavaScript | Language::TypeScript)
    }
}

impl From<&str> for Language {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "javascript" | "js" | "node" | "nodejs" => Language::JavaScript,
            "typescript" | "ts" => Language::TypeScript,
            "python" | "python3" | "py" => Language::Python,
            "bash" | "sh" | "shell" => Language::Bash,
            other => Language::Other(other.to_string()),
        }
    }
}

impl From<String> for Language {
    fn from(value: String) -> Self {
        Language::from(value.as_str())
    }
}

impl From<Language> for String {
    fn from(value: Language) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of an execution backend. The set is closed; adding a backend
/// means adding a variant, an adapter, and a fallback table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Microsandbox,
    LocalVm,
    LocalProcess,
    WasmSandbox,
    BatchCluster,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Microsandbox,
        BackendKind::LocalVm,
        BackendKind::LocalProcess,
        BackendKind::WasmSandbox,
        BackendKind::BatchCluster,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Microsandbox => "microsandbox",
            BackendKind::LocalVm => "local-vm",
            BackendKind::LocalProcess => "local-process",
            BackendKind::WasmSandbox => "wasm-sandbox",
            BackendKind::BatchCluster => "batch-cluster",
        }
    }

    /// Local backend that serves a language: VM for js/ts, subprocess otherwise.
    pub fn local_for(language: &Language) -> BackendKind {
        if language.is_js_family() {
            BackendKind::LocalVm
        } else {
            BackendKind::LocalProcess
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, BackendKind::LocalVm | BackendKind::LocalProcess)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "microsandbox" => Ok(BackendKind::Microsandbox),
            "local-vm" | "local" | "vm" | "node" => Ok(BackendKind::LocalVm),
            "local-process" | "subprocess" | "process" => Ok(BackendKind::LocalProcess),
            "wasm-sandbox" | "wasm" => Ok(BackendKind::WasmSandbox),
            "batch-cluster" | "cluster" | "batch" => Ok(BackendKind::BatchCluster),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Caller override for backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendOverride {
    Auto,
    Use(BackendKind),
}

impl FromStr for BackendOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(BackendOverride::Auto)
        } else {
            s.parse().map(BackendOverride::Use)
        }
    }
}

impl TryFrom<String> for BackendOverride {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendOverride> for String {
    fn from(value: BackendOverride) -> Self {
        match value {
            BackendOverride::Auto => "auto".to_string(),
            BackendOverride::Use(kind) => kind.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_backend: Option<BackendOverride>,
    #[serde(default)]
    pub requires_sandbox: bool,
    #[serde(default)]
    pub long_running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_duration_ms: Option<u64>,
}

impl ExecutionConstraints {
    /// The explicit backend, unless absent or `auto`.
    pub fn forced_backend(&self) -> Option<BackendKind> {
        match self.explicit_backend {
            Some(BackendOverride::Use(kind)) => Some(kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceHints {
    #[serde(default)]
    pub gpu: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub language: Language,
    pub source_code: String,
    #[serde(default)]
    pub input_payload: Value,
    #[serde(default)]
    pub constraints: ExecutionConstraints,
    #[serde(default)]
    pub resource_hints: ResourceHints,
    pub timeout_ms: u64,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<Language>, source_code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            source_code: source_code.into(),
            input_payload: Value::Null,
            constraints: ExecutionConstraints::default(),
            resource_hints: ResourceHints::default(),
            timeout_ms: 30_000,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input_payload = input;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_backend(mut self, backend: BackendOverride) -> Self {
        self.constraints.explicit_backend = Some(backend);
        self
    }

    pub fn with_sandbox(mut self, requires_sandbox: bool) -> Self {
        self.constraints.requires_sandbox = requires_sandbox;
        self
    }

    pub fn with_long_running(mut self, long_running: bool) -> Self {
        self.constraints.long_running = long_running;
        self
    }

    pub fn with_expected_duration_ms(mut self, expected_ms: u64) -> Self {
        self.constraints.expected_duration_ms = Some(expected_ms);
        self
    }

    pub fn with_resource_hints(mut self, hints: ResourceHints) -> Self {
        self.resource_hints = hints;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
    pub backend_id: BackendKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub backend_id: BackendKind,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<BackendKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl ResultMetadata {
    pub fn new(backend_id: BackendKind, duration_ms: u64) -> Self {
        Self {
            backend_id,
            duration_ms,
            job_id: None,
            exit_code: None,
            fallback_from: None,
            stderr: None,
        }
    }
}

/// Canonical result. `output` is present iff `success`, `error` iff not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub metadata: ResultMetadata,
}

impl ExecutionResult {
    pub fn succeeded(output: Value, metadata: ResultMetadata) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
            metadata,
        }
    }

    pub fn failed(error: ExecutionError, metadata: ResultMetadata) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
            metadata,
        }
    }

    pub fn error_kind(&self) -> Option<ExecutionErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub(crate) fn with_fallback_from(mut self, original: Option<BackendKind>) -> Self {
        self.metadata.fallback_from = original;
        self
    }
}
