//! Asynchronous adapter for the distributed batch cluster.
//!
//! The cluster itself is reached through a `ClusterClient` (typically a CLI
//! or HTTP wrapper owned by the embedding application). The adapter turns an
//! `ExecutionRequest` into a cluster job spec and translates the cluster's
//! native job states into the three logical states the lifecycle manager
//! understands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::{AsyncBackend, BackendDescriptor, RawOutput, RemoteJobState};
use crate::core_types::{BackendKind, ExecutionRequest, Language};
use crate::errors::BackendError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterJobSpec {
    pub name: String,
    pub language: Language,
    pub source_code: String,
    pub input: Value,
    pub gpu: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    pub timeout_ms: u64,
}

/// Job status exactly as the cluster reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterJobStatus {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Credentials and tooling present.
    async fn is_configured(&self) -> bool;

    fn remediation(&self) -> String {
        "Install and authenticate the batch cluster client, then verify it can list jobs".to_string()
    }

    async fn submit(&self, spec: &ClusterJobSpec) -> Result<String, BackendError>;

    async fn status(&self, job_id: &str) -> Result<ClusterJobStatus, BackendError>;

    /// Captured stdout of a finished job.
    async fn output(&self, job_id: &str) -> Result<String, BackendError>;

    async fn cancel(&self, job_id: &str) -> Result<(), BackendError>;
}

pub struct BatchClusterAdapter {
    descriptor: BackendDescriptor,
    client: Arc<dyn ClusterClient>,
}

impl BatchClusterAdapter {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self::with_descriptor(BackendDescriptor::defaults_for(BackendKind::BatchCluster), client)
    }

    pub fn with_descriptor(descriptor: BackendDescriptor, client: Arc<dyn ClusterClient>) -> Self {
        Self { descriptor, client }
    }

    fn job_spec(&self, request: &ExecutionRequest) -> ClusterJobSpec {
        let hints = &request.resource_hints;
        ClusterJobSpec {
            name: format!("runlane-{}", Uuid::new_v4()),
            language: request.language.clone(),
            source_code: request.source_code.clone(),
            input: request.input_payload.clone(),
            gpu: hints.gpu,
            gpu_count: hints.gpu_count,
            memory: hints.memory.clone(),
            cpu: hints.cpu,
            timeout_ms: request.timeout_ms.min(self.descriptor.max_single_run_ms),
        }
    }
}

#[async_trait]
impl AsyncBackend for BatchClusterAdapter {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn check_available(&self) -> bool {
        self.client.is_configured().await
    }

    fn remediation(&self) -> String {
        self.client.remediation()
    }

    async fn submit(&self, request: &ExecutionRequest) -> Result<String, BackendError> {
        if !self.descriptor.supports(&request.language) {
            return Err(BackendError::UnsupportedLanguage(request.language.to_string()));
        }
        let spec = self.job_spec(request);
        log::debug!("Submitting cluster job {}", spec.name);
        self.client.submit(&spec).await
    }

    async fn get_status(&self, job_id: &str) -> Result<RemoteJobState, BackendError> {
        let status = self.client.status(job_id).await?;
        Ok(RemoteJobState::from_native(&status.state, status.error))
    }

    async fn fetch_result(&self, job_id: &str) -> Result<RawOutput, BackendError> {
        let stdout = self.client.output(job_id).await?;
        Ok(RawOutput {
            stdout,
            stderr: String::new(),
            exit_code: None,
        })
    }

    async fn cancel(&self, job_id: &str) -> Result<(), BackendError> {
        self.client.cancel(job_id).await
    }
}
