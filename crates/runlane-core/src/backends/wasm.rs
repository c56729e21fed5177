use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{BackendDescriptor, RawOutput, SyncBackend};
use crate::core_types::{BackendKind, ExecutionRequest};
use crate::errors::BackendError;

/// Placeholder for the WASM sandbox. It is part of the backend set so that
/// selection and fallback can name it, but it cannot run anything yet.
pub struct WasmSandboxAdapter {
    descriptor: BackendDescriptor,
}

impl WasmSandboxAdapter {
    pub fn new() -> Self {
        Self::with_descriptor(BackendDescriptor::defaults_for(BackendKind::WasmSandbox))
    }

    pub fn with_descriptor(descriptor: BackendDescriptor) -> Self {
        Self { descriptor }
    }
}

impl Default for WasmSandboxAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncBackend for WasmSandboxAdapter {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn check_available(&self) -> bool {
        false
    }

    fn remediation(&self) -> String {
        "The WASM sandbox backend is not implemented yet; request a local or microsandbox backend instead"
            .to_string()
    }

    fn is_wired(&self) -> bool {
        false
    }

    async fn run_sync(
        &self,
        _request: &ExecutionRequest,
        _budget: Duration,
        _cancel: &CancellationToken,
    ) -> Result<RawOutput, BackendError> {
        Err(BackendError::NotImplemented)
    }
}
