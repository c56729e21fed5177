//! Execution backends and the adapter contract the orchestrator consumes.
//!
//! A backend is either synchronous (run now, return output) or asynchronous
//! (submit, poll, fetch). Both kinds describe themselves with a static
//! `BackendDescriptor` and report availability; the orchestrator never looks
//! inside an adapter beyond this contract.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core_types::{BackendKind, ExecutionRequest, Language};
use crate::errors::BackendError;

pub mod batch_cluster;
pub mod local;
pub mod microsandbox;
pub mod registry;
pub mod wasm;

pub use batch_cluster::{BatchClusterAdapter, ClusterClient};
pub use local::LocalAdapter;
pub use microsandbox::{MicrosandboxAdapter, SandboxProvider, SandboxSession, SandboxSpec};
pub use registry::BackendRegistry;
pub use wasm::WasmSandboxAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IsolationLevel {
    None,
    Process,
    Vm,
    Cluster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyClass {
    Sub50Ms,
    Seconds,
    Minutes,
}

/// Static description of one backend.
#[derive(Debug, Clone)]
pub struct BackendDescriptor {
    pub id: BackendKind,
    pub supports_languages: HashSet<Language>,
    pub isolation_level: IsolationLevel,
    pub startup_latency: LatencyClass,
    pub supports_gpu: bool,
    pub max_single_run_ms: u64,
}

impl BackendDescriptor {
    /// Built-in descriptor for a backend kind.
    pub fn defaults_for(kind: BackendKind) -> Self {
        let all = [
            Language::JavaScript,
            Language::TypeScript,
            Language::Python,
            Language::Bash,
        ];
        let (languages, isolation_level, startup_latency, supports_gpu, max_single_run_ms) = match kind {
            BackendKind::Microsandbox => {
                (all.to_vec(), IsolationLevel::Vm, LatencyClass::Sub50Ms, false, 30_000)
            }
            BackendKind::LocalVm => (
                vec![Language::JavaScript, Language::TypeScript],
                IsolationLevel::Process,
                LatencyClass::Sub50Ms,
                false,
                60_000,
            ),
            BackendKind::LocalProcess => (
                vec![Language::Python, Language::Bash],
                IsolationLevel::Process,
                LatencyClass::Sub50Ms,
                false,
                300_000,
            ),
            BackendKind::WasmSandbox => (
                vec![Language::JavaScript, Language::Python],
                IsolationLevel::Vm,
                LatencyClass::Sub50Ms,
                false,
                30_000,
            ),
            BackendKind::BatchCluster => (
                all.to_vec(),
                IsolationLevel::Cluster,
                LatencyClass::Minutes,
                true,
                3_600_000,
            ),
        };

        Self {
            id: kind,
            supports_languages: languages.into_iter().collect(),
            isolation_level,
            startup_latency,
            supports_gpu,
            max_single_run_ms,
        }
    }

    pub fn with_max_single_run_ms(mut self, max_single_run_ms: u64) -> Self {
        self.max_single_run_ms = max_single_run_ms;
        self
    }

    pub fn supports(&self, language: &Language) -> bool {
        self.supports_languages.contains(language)
    }

    /// `min(request.timeout_ms, max_single_run_ms)`, computed once per request.
    pub fn budget_for(&self, request: &ExecutionRequest) -> Duration {
        Duration::from_millis(request.timeout_ms.min(self.max_single_run_ms))
    }
}

/// Raw process or job output, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl RawOutput {
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }
}

/// Logical state of a remote job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteJobState {
    Running,
    Completed,
    Failed { message: Option<String> },
}

impl RemoteJobState {
    /// Map a backend-native state string. Unrecognised states are treated as
    /// running so a healthy job is never abandoned on ambiguity.
    pub fn from_native(state: &str, message: Option<String>) -> Self {
        match state.trim().to_lowercase().as_str() {
            "queued" | "pending" | "submitted" | "running" | "in_progress" | "in-progress"
            | "starting" => RemoteJobState::Running,
            "completed" | "succeeded" | "success" | "done" => RemoteJobState::Completed,
            "failed" | "error" | "errored" | "cancelled" | "canceled" | "terminated"
            | "timeout" => RemoteJobState::Failed { message },
            other => {
                log::warn!("Unrecognised remote job state '{}', treating as running", other);
                RemoteJobState::Running
            }
        }
    }
}

#[async_trait]
pub trait SyncBackend: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    async fn check_available(&self) -> bool;

    /// How an operator enables this backend when it reports unavailable.
    fn remediation(&self) -> String;

    /// `false` for placeholder backends with no working implementation.
    fn is_wired(&self) -> bool {
        true
    }

    /// Run to completion within `budget`, stopping early if `cancel` fires.
    /// Any remote handle acquired must be released before returning.
    async fn run_sync(
        &self,
        request: &ExecutionRequest,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<RawOutput, BackendError>;
}

#[async_trait]
pub trait AsyncBackend: Send + Sync {
    fn descriptor(&self) -> &BackendDescriptor;

    async fn check_available(&self) -> bool;

    fn remediation(&self) -> String;

    fn is_wired(&self) -> bool {
        true
    }

    async fn submit(&self, request: &ExecutionRequest) -> Result<String, BackendError>;

    async fn get_status(&self, job_id: &str) -> Result<RemoteJobState, BackendError>;

    async fn fetch_result(&self, job_id: &str) -> Result<RawOutput, BackendError>;

    /// Best-effort remote cancel, only issued on caller abort.
    async fn cancel(&self, _job_id: &str) -> Result<(), BackendError> {
        Ok(())
    }
}

#[derive(Clone)]
pub enum Adapter {
    Sync(Arc<dyn SyncBackend>),
    Async(Arc<dyn AsyncBackend>),
}

impl Adapter {
    pub fn descriptor(&self) -> &BackendDescriptor {
        match self {
            Adapter::Sync(backend) => backend.descriptor(),
            Adapter::Async(backend) => backend.descriptor(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.descriptor().id
    }

    pub async fn check_available(&self) -> bool {
        match self {
            Adapter::Sync(backend) => backend.check_available().await,
            Adapter::Async(backend) => backend.check_available().await,
        }
    }

    pub fn remediation(&self) -> String {
        match self {
            Adapter::Sync(backend) => backend.remediation(),
            Adapter::Async(backend) => backend.remediation(),
        }
    }

    pub fn is_wired(&self) -> bool {
        match self {
            Adapter::Sync(backend) => backend.is_wired(),
            Adapter::Async(backend) => backend.is_wired(),
        }
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self {
            Adapter::Sync(_) => "sync",
            Adapter::Async(_) => "async",
        };
        f.debug_struct("Adapter")
            .field("kind", &self.kind())
            .field("mode", &mode)
            .finish()
    }
}
