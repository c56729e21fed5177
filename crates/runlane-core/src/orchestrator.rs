//! Entry point for executing a request.
//!
//! The orchestrator selects a backend, takes at most one fallback hop, checks
//! that the final backend speaks the request's language, and then drives
//! either the synchronous path or the job lifecycle. Every outcome, including
//! misconfiguration, comes back as an `ExecutionResult`.

use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::backends::{Adapter, BackendRegistry, SyncBackend};
use crate::config::{BackendsConfig, OrchestratorConfig, RunlaneConfig};
use crate::core_types::{BackendKind, ExecutionRequest, ExecutionResult};
use crate::errors::{BackendError, ExecutionErrorKind};
use crate::lifecycle::JobLifecycleManager;
use crate::normalizer::{NormalizeContext, ResultNormalizer};
use crate::selection::{AvailabilitySnapshot, FallbackReason, SelectionPolicy};

/// Whether a backend can take a request right now.
enum Readiness {
    Ready(Adapter),
    Unwired { remediation: Option<String> },
    Unavailable { remediation: String },
}

/// Why resolution stopped, reported against `backend`.
struct Unusable {
    backend: BackendKind,
    kind: ExecutionErrorKind,
    message: String,
    remediation: Option<String>,
}

/// The backend that will actually run the request.
struct Resolved {
    kind: BackendKind,
    adapter: Adapter,
    fallback_from: Option<BackendKind>,
}

pub struct Orchestrator {
    registry: BackendRegistry,
    lifecycle: JobLifecycleManager,
    settings: OrchestratorConfig,
    backends: BackendsConfig,
}

impl Orchestrator {
    pub fn new(registry: BackendRegistry, config: &RunlaneConfig) -> Self {
        Self {
            registry,
            lifecycle: JobLifecycleManager::new(Duration::from_millis(
                config.lifecycle.poll_interval_ms,
            )),
            settings: config.orchestrator.clone(),
            backends: config.backends.clone(),
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Execute `request`, aborting early when `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let started = Instant::now();

        let availability = self.snapshot(request).await;
        let selection = SelectionPolicy::select(request, &availability);

        let resolved = match self.resolve(selection.backend, request).await {
            Ok(resolved) => resolved,
            Err(unusable) => {
                let ctx = NormalizeContext::new(unusable.backend, started.elapsed());
                return ResultNormalizer::failure(
                    &ctx,
                    unusable.kind,
                    unusable.message,
                    unusable.remediation,
                );
            }
        };

        let descriptor = resolved.adapter.descriptor();
        if !descriptor.supports(&request.language) {
            let ctx = NormalizeContext::new(resolved.kind, started.elapsed());
            return ResultNormalizer::failure(
                &ctx,
                ExecutionErrorKind::UnsupportedLanguage,
                format!(
                    "Language '{}' is not supported by {}",
                    request.language, resolved.kind
                ),
                None,
            )
            .with_fallback_from(resolved.fallback_from);
        }

        if request.resource_hints.gpu && !descriptor.supports_gpu {
            log::warn!(
                "GPU requested but {} has no GPU support, running without one",
                resolved.kind
            );
        }

        let budget = descriptor.budget_for(request);
        log::info!(
            "Executing {} request on {} with a {} ms budget",
            request.language,
            resolved.kind,
            budget.as_millis()
        );

        let result = match &resolved.adapter {
            Adapter::Sync(backend) => {
                self.run_sync(backend.as_ref(), resolved.kind, request, budget, cancel)
                    .await
            }
            Adapter::Async(backend) => {
                self.lifecycle
                    .submit_and_run(backend.as_ref(), request, budget, cancel)
                    .await
            }
        };

        result.with_fallback_from(resolved.fallback_from)
    }

    /// Microsandbox is only probed when a fast-path rule could pick it.
    async fn snapshot(&self, request: &ExecutionRequest) -> AvailabilitySnapshot {
        let microsandbox = SelectionPolicy::wants_fast_path(request)
            && request.constraints.forced_backend().is_none()
            && !request.constraints.long_running
            && matches!(
                self.readiness(BackendKind::Microsandbox).await,
                Readiness::Ready(_)
            );
        AvailabilitySnapshot { microsandbox }
    }

    async fn readiness(&self, kind: BackendKind) -> Readiness {
        let Some(adapter) = self.registry.get(kind) else {
            return Readiness::Unwired { remediation: None };
        };
        if !adapter.is_wired() {
            return Readiness::Unwired {
                remediation: Some(adapter.remediation()),
            };
        }
        if !self.backends.is_enabled(kind) {
            return Readiness::Unavailable {
                remediation: format!(
                    "Enable backends.{} in the runlane configuration",
                    kind.as_str().replace('-', "_")
                ),
            };
        }
        if !adapter.check_available().await {
            return Readiness::Unavailable {
                remediation: adapter.remediation(),
            };
        }
        Readiness::Ready(adapter.clone())
    }

    /// Re-check the selected backend and take the single fallback hop if
    /// needed.
    async fn resolve(
        &self,
        selected: BackendKind,
        request: &ExecutionRequest,
    ) -> Result<Resolved, Unusable> {
        let (reason, remediation) = match self.readiness(selected).await {
            Readiness::Ready(adapter) => {
                return Ok(Resolved {
                    kind: selected,
                    adapter,
                    fallback_from: None,
                })
            }
            Readiness::Unwired { remediation } => (FallbackReason::Unwired, remediation),
            Readiness::Unavailable { remediation } => {
                (FallbackReason::Unavailable, Some(remediation))
            }
        };

        let target = SelectionPolicy::fallback_for(selected, reason, &request.language)
            .filter(|_| self.fallback_allowed(selected, reason));

        let Some(target) = target else {
            return Err(Self::unusable(selected, reason, remediation));
        };

        log::warn!(
            "{} is {}, falling back to {}",
            selected,
            match reason {
                FallbackReason::Unavailable => "unavailable",
                FallbackReason::Unwired => "not wired",
            },
            target
        );

        match self.readiness(target).await {
            Readiness::Ready(adapter) => Ok(Resolved {
                kind: target,
                adapter,
                fallback_from: Some(selected),
            }),
            Readiness::Unwired { remediation } => {
                Err(Self::unusable(target, FallbackReason::Unwired, remediation))
            }
            Readiness::Unavailable { remediation } => Err(Self::unusable(
                target,
                FallbackReason::Unavailable,
                Some(remediation),
            )),
        }
    }

    /// The unwired wasm/batch hop is operator policy; the microsandbox hop is not.
    fn fallback_allowed(&self, selected: BackendKind, reason: FallbackReason) -> bool {
        reason == FallbackReason::Unavailable
            || selected == BackendKind::Microsandbox
            || self.settings.unwired_fallback_to_local
    }

    fn unusable(
        backend: BackendKind,
        reason: FallbackReason,
        remediation: Option<String>,
    ) -> Unusable {
        let (kind, message) = match reason {
            FallbackReason::Unavailable => (
                ExecutionErrorKind::NotAvailable,
                format!("Backend {} is not available", backend),
            ),
            FallbackReason::Unwired => (
                ExecutionErrorKind::NotImplemented,
                format!("Backend {} is not implemented", backend),
            ),
        };
        Unusable {
            backend,
            kind,
            message,
            remediation,
        }
    }

    /// The adapter owns its budget. The outer timeout only catches adapters
    /// that overrun it, and gives them `cleanup_grace_ms` to release handles
    /// after their token is cancelled.
    async fn run_sync(
        &self,
        backend: &dyn SyncBackend,
        kind: BackendKind,
        request: &ExecutionRequest,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let started = Instant::now();
        let grace = Duration::from_millis(self.settings.cleanup_grace_ms);
        let child = cancel.child_token();

        let mut run = backend.run_sync(request, budget, &child);
        let outcome = match timeout(budget + grace, &mut run).await {
            Ok(outcome) => outcome,
            Err(_) => {
                log::warn!(
                    "{} overran its {} ms budget, cancelling",
                    kind,
                    budget.as_millis()
                );
                child.cancel();
                if timeout(grace, &mut run).await.is_err() {
                    log::warn!("{} did not stop within the cleanup grace", kind);
                }
                Err(BackendError::Timeout)
            }
        };

        let ctx = NormalizeContext::new(kind, started.elapsed());
        match outcome {
            Ok(raw) => ResultNormalizer::from_output(&ctx, raw),
            Err(error) => {
                log::debug!("{} returned {}", kind, error);
                ResultNormalizer::from_error(&ctx, error, Some(backend.remediation()))
            }
        }
    }
}
