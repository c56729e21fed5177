use std::collections::HashMap;
use std::sync::Arc;

use super::{
    Adapter, AsyncBackend, BatchClusterAdapter, ClusterClient, LocalAdapter, MicrosandboxAdapter,
    SandboxProvider, SyncBackend, WasmSandboxAdapter,
};
use crate::config::RunlaneConfig;
use crate::core_types::BackendKind;

/// One adapter per backend kind. A kind with no registered adapter is
/// "not wired".
#[derive(Clone, Default)]
pub struct BackendRegistry {
    adapters: HashMap<BackendKind, Adapter>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local VM, local process and the WASM placeholder, configured from
    /// `config`. Microsandbox and batch cluster need transports supplied by
    /// the caller and are added with `with_microsandbox`/`with_batch_cluster`.
    pub fn from_config(config: &RunlaneConfig) -> Self {
        let backends = &config.backends;
        let mut registry = Self::new();
        registry.register_sync(Arc::new(LocalAdapter::new(
            backends.descriptor(BackendKind::LocalVm),
            &config.local,
        )));
        registry.register_sync(Arc::new(LocalAdapter::new(
            backends.descriptor(BackendKind::LocalProcess),
            &config.local,
        )));
        registry.register_sync(Arc::new(WasmSandboxAdapter::with_descriptor(
            backends.descriptor(BackendKind::WasmSandbox),
        )));
        registry
    }

    pub fn with_microsandbox(
        mut self,
        config: &RunlaneConfig,
        provider: Arc<dyn SandboxProvider>,
    ) -> Self {
        let descriptor = config.backends.descriptor(BackendKind::Microsandbox);
        self.register_sync(Arc::new(MicrosandboxAdapter::with_descriptor(descriptor, provider)));
        self
    }

    pub fn with_batch_cluster(
        mut self,
        config: &RunlaneConfig,
        client: Arc<dyn ClusterClient>,
    ) -> Self {
        let descriptor = config.backends.descriptor(BackendKind::BatchCluster);
        self.register_async(Arc::new(BatchClusterAdapter::with_descriptor(descriptor, client)));
        self
    }

    pub fn register(&mut self, adapter: Adapter) -> Option<Adapter> {
        let kind = adapter.kind();
        log::debug!("Registered {} backend adapter", kind);
        self.adapters.insert(kind, adapter)
    }

    pub fn register_sync(&mut self, backend: Arc<dyn SyncBackend>) -> Option<Adapter> {
        self.register(Adapter::Sync(backend))
    }

    pub fn register_async(&mut self, backend: Arc<dyn AsyncBackend>) -> Option<Adapter> {
        self.register(Adapter::Async(backend))
    }

    pub fn get(&self, kind: BackendKind) -> Option<&Adapter> {
        self.adapters.get(&kind)
    }

    /// Registered and backed by a working implementation.
    pub fn is_wired(&self, kind: BackendKind) -> bool {
        self.adapters.get(&kind).map(Adapter::is_wired).unwrap_or(false)
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
