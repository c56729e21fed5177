//! Synchronous driver for ephemeral microsandboxes.
//!
//! The transport to the sandbox server is supplied by the embedding
//! application as a `SandboxProvider`. This module owns the protocol around
//! it: acquire a sandbox, write the script and its input, start the
//! interpreter, race completion against the budget and the caller's
//! cancellation, and release the sandbox exactly once whichever side wins.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{BackendDescriptor, RawOutput, SyncBackend};
use crate::core_types::{BackendKind, ExecutionRequest, Language};
use crate::errors::BackendError;

pub const SANDBOX_WORK_DIR: &str = "/sandbox";

/// What to ask the sandbox server for.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxSpec {
    pub name: String,
    pub language: Language,
    pub memory: Option<String>,
    pub cpu: Option<f64>,
}

#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn is_reachable(&self) -> bool;

    fn remediation(&self) -> String {
        "Start the microsandbox server and make sure its endpoint is reachable from this host"
            .to_string()
    }

    async fn acquire(&self, spec: &SandboxSpec) -> Result<Box<dyn SandboxSession>, BackendError>;
}

/// One acquired sandbox. `release` must be safe to call after a run was
/// abandoned mid-flight.
#[async_trait]
pub trait SandboxSession: Send + Sync {
    fn id(&self) -> &str;

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), BackendError>;

    async fn run(&self, program: &str, args: &[String]) -> Result<RawOutput, BackendError>;

    async fn release(&self) -> Result<(), BackendError>;
}

pub struct MicrosandboxAdapter {
    descriptor: BackendDescriptor,
    provider: Arc<dyn SandboxProvider>,
}

impl MicrosandboxAdapter {
    pub fn new(provider: Arc<dyn SandboxProvider>) -> Self {
        Self::with_descriptor(BackendDescriptor::defaults_for(BackendKind::Microsandbox), provider)
    }

    pub fn with_descriptor(descriptor: BackendDescriptor, provider: Arc<dyn SandboxProvider>) -> Self {
        Self { descriptor, provider }
    }

    /// Interpreter invocation inside the sandbox.
    fn invocation(language: &Language, script: &str) -> Option<(&'static str, Vec<String>)> {
        let invocation = match language {
            Language::Python => ("python3", vec![script.to_string()]),
            Language::JavaScript => ("node", vec![script.to_string()]),
            Language::TypeScript => (
                "node",
                vec!["--experimental-strip-types".to_string(), script.to_string()],
            ),
            Language::Bash => ("bash", vec![script.to_string()]),
            Language::Other(_) => return None,
        };
        Some(invocation)
    }

    async fn drive(
        session: &dyn SandboxSession,
        request: &ExecutionRequest,
        program: &str,
        args: &[String],
        script_path: &str,
    ) -> Result<RawOutput, BackendError> {
        let input = serde_json::to_vec(&request.input_payload)?;
        session
            .write_file(script_path, request.source_code.as_bytes())
            .await?;
        session
            .write_file(&format!("{}/input.json", SANDBOX_WORK_DIR), &input)
            .await?;
        session.run(program, args).await
    }
}

#[async_trait]
impl SyncBackend for MicrosandboxAdapter {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn check_available(&self) -> bool {
        self.provider.is_reachable().await
    }

    fn remediation(&self) -> String {
        self.provider.remediation()
    }

    async fn run_sync(
        &self,
        request: &ExecutionRequest,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<RawOutput, BackendError> {
        if !self.descriptor.supports(&request.language) {
            return Err(BackendError::UnsupportedLanguage(request.language.to_string()));
        }
        let script_path = format!(
            "{}/main.{}",
            SANDBOX_WORK_DIR,
            request.language.file_extension()
        );
        let (program, args) = Self::invocation(&request.language, &script_path)
            .ok_or_else(|| BackendError::UnsupportedLanguage(request.language.to_string()))?;

        let deadline = Instant::now() + budget;
        let spec = SandboxSpec {
            name: format!("runlane-{}", Uuid::new_v4()),
            language: request.language.clone(),
            memory: request.resource_hints.memory.clone(),
            cpu: request.resource_hints.cpu,
        };

        // No handle exists until acquire resolves, so abandoning it leaks nothing locally.
        let session = tokio::select! {
            res = self.provider.acquire(&spec) => res?,
            _ = sleep_until(deadline) => return Err(BackendError::Timeout),
            _ = cancel.cancelled() => return Err(BackendError::Cancelled),
        };
        log::debug!("Acquired microsandbox {}", session.id());

        let outcome = tokio::select! {
            res = Self::drive(session.as_ref(), request, program, &args, &script_path) => res,
            _ = sleep_until(deadline) => {
                log::warn!("Microsandbox {} timed out after {:?}", session.id(), budget);
                Err(BackendError::Timeout)
            }
            _ = cancel.cancelled() => {
                log::info!("Microsandbox {} cancelled by caller", session.id());
                Err(BackendError::Cancelled)
            }
        };

        if let Err(e) = session.release().await {
            log::warn!("Failed to release microsandbox {}: {}", session.id(), e);
        } else {
            log::debug!("Released microsandbox {}", session.id());
        }

        outcome
    }
}
