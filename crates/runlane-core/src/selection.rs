//! Backend selection policy.
//!
//! `SelectionPolicy::select` is a pure function of the request and an
//! availability snapshot taken beforehand by the orchestrator. Rules are
//! evaluated in a fixed order and the first match wins; callers rely on the
//! result being deterministic.

use crate::core_types::{BackendKind, ExecutionRequest, Language};

/// Requests expected to finish faster than this may take the microsandbox.
pub const FAST_PATH_THRESHOLD_MS: u64 = 50;

/// Availability facts selection is allowed to depend on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailabilitySnapshot {
    pub microsandbox: bool,
}

/// Which rule produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRule {
    ExplicitOverride,
    LongRunning,
    SandboxFastPath,
    SandboxLocal,
    FastPath,
    LanguageDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub backend: BackendKind,
    pub rule: SelectionRule,
}

/// Why the selected backend cannot be used as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    Unavailable,
    Unwired,
}

pub struct SelectionPolicy;

impl SelectionPolicy {
    pub fn select(request: &ExecutionRequest, availability: &AvailabilitySnapshot) -> Selection {
        let constraints = &request.constraints;

        let (backend, rule) = if let Some(kind) = constraints.forced_backend() {
            (kind, SelectionRule::ExplicitOverride)
        } else if constraints.long_running {
            (BackendKind::BatchCluster, SelectionRule::LongRunning)
        } else if constraints.requires_sandbox {
            if Self::fast_path_applies(request, availability) {
                (BackendKind::Microsandbox, SelectionRule::SandboxFastPath)
            } else {
                // Best-effort isolation: no stronger backend is reachable here.
                (Self::language_default(&request.language), SelectionRule::SandboxLocal)
            }
        } else if Self::fast_path_applies(request, availability) {
            (BackendKind::Microsandbox, SelectionRule::FastPath)
        } else {
            (Self::language_default(&request.language), SelectionRule::LanguageDefault)
        };

        log::debug!("Selected {} via {:?}", backend, rule);
        Selection { backend, rule }
    }

    /// `expectedDurationMs` is set and below the fast-path threshold.
    pub fn wants_fast_path(request: &ExecutionRequest) -> bool {
        matches!(
            request.constraints.expected_duration_ms,
            Some(expected) if expected < FAST_PATH_THRESHOLD_MS
        )
    }

    fn fast_path_applies(request: &ExecutionRequest, availability: &AvailabilitySnapshot) -> bool {
        Self::wants_fast_path(request) && availability.microsandbox
    }

    /// js/ts and unknown languages go to the local VM, python/bash to a subprocess.
    pub fn language_default(language: &Language) -> BackendKind {
        match language {
            Language::Python | Language::Bash => BackendKind::LocalProcess,
            Language::JavaScript | Language::TypeScript | Language::Other(_) => BackendKind::LocalVm,
        }
    }

    /// The single fallback hop. `None` means the failure is surfaced as-is.
    pub fn fallback_for(
        selected: BackendKind,
        reason: FallbackReason,
        language: &Language,
    ) -> Option<BackendKind> {
        match (selected, reason) {
            (BackendKind::Microsandbox, _) => Some(BackendKind::local_for(language)),
            (BackendKind::WasmSandbox | BackendKind::BatchCluster, FallbackReason::Unwired) => {
                Some(BackendKind::local_for(language))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::BackendOverride;

    const UP: AvailabilitySnapshot = AvailabilitySnapshot { microsandbox: true };
    const DOWN: AvailabilitySnapshot = AvailabilitySnapshot { microsandbox: false };

    fn languages() -> Vec<Language> {
        vec![
            Language::JavaScript,
            Language::TypeScript,
            Language::Python,
            Language::Bash,
            Language::Other("ruby".to_string()),
        ]
    }

    fn variants() -> Vec<ExecutionRequest> {
        let mut requests = Vec::new();
        for language in languages() {
            for sandbox in [false, true] {
                for long_running in [false, true] {
                    for expected in [None, Some(0), Some(20), Some(49), Some(50), Some(5_000)] {
                        let mut request = ExecutionRequest::new(language.clone(), "x")
                            .with_sandbox(sandbox)
                            .with_long_running(long_running);
                        request.constraints.expected_duration_ms = expected;
                        requests.push(request);
                    }
                }
            }
        }
        requests
    }

    #[test]
    fn test_explicit_override_wins_over_everything() {
        let request = ExecutionRequest::new("python", "x")
            .with_long_running(true)
            .with_expected_duration_ms(1)
            .with_backend(BackendOverride::Use(BackendKind::WasmSandbox));

        let selection = SelectionPolicy::select(&request, &UP);
        assert_eq!(selection.backend, BackendKind::WasmSandbox);
        assert_eq!(selection.rule, SelectionRule::ExplicitOverride);
    }

    #[test]
    fn test_auto_override_is_ignored() {
        let request = ExecutionRequest::new("bash", "x").with_backend(BackendOverride::Auto);
        assert_eq!(
            SelectionPolicy::select(&request, &UP).backend,
            BackendKind::LocalProcess
        );
    }

    #[test]
    fn test_long_running_always_selects_batch_cluster() {
        for request in variants().into_iter().filter(|r| r.constraints.long_running) {
            for availability in [UP, DOWN] {
                assert_eq!(
                    SelectionPolicy::select(&request, &availability).backend,
                    BackendKind::BatchCluster
                );
            }
        }
    }

    #[test]
    fn test_sandbox_with_slow_or_unknown_duration_never_selects_microsandbox() {
        for request in variants().into_iter().filter(|r| {
            r.constraints.requires_sandbox && !SelectionPolicy::wants_fast_path(r)
        }) {
            assert_ne!(
                SelectionPolicy::select(&request, &UP).backend,
                BackendKind::Microsandbox
            );
        }
    }

    #[test]
    fn test_selection_is_deterministic() {
        for request in variants() {
            for availability in [UP, DOWN] {
                assert_eq!(
                    SelectionPolicy::select(&request, &availability),
                    SelectionPolicy::select(&request.clone(), &availability)
                );
            }
        }
    }

    #[test]
    fn test_sandbox_fast_path_depends_on_availability() {
        let request = ExecutionRequest::new("javascript", "x")
            .with_sandbox(true)
            .with_expected_duration_ms(20);

        let up = SelectionPolicy::select(&request, &UP);
        assert_eq!(up.backend, BackendKind::Microsandbox);
        assert_eq!(up.rule, SelectionRule::SandboxFastPath);

        let down = SelectionPolicy::select(&request, &DOWN);
        assert_eq!(down.backend, BackendKind::LocalVm);
        assert_eq!(down.rule, SelectionRule::SandboxLocal);
    }

    #[test]
    fn test_fast_path_without_sandbox_requirement() {
        let request = ExecutionRequest::new("python", "x").with_expected_duration_ms(10);
        let selection = SelectionPolicy::select(&request, &UP);
        assert_eq!(selection.backend, BackendKind::Microsandbox);
        assert_eq!(selection.rule, SelectionRule::FastPath);

        let boundary = ExecutionRequest::new("python", "x").with_expected_duration_ms(50);
        assert_eq!(
            SelectionPolicy::select(&boundary, &UP).backend,
            BackendKind::LocalProcess
        );
    }

    #[test]
    fn test_language_defaults() {
        let pick = |language: &str| {
            SelectionPolicy::select(&ExecutionRequest::new(language, "x"), &UP).backend
        };
        assert_eq!(pick("bash"), BackendKind::LocalProcess);
        assert_eq!(pick("python"), BackendKind::LocalProcess);
        assert_eq!(pick("typescript"), BackendKind::LocalVm);
        assert_eq!(pick("javascript"), BackendKind::LocalVm);
        assert_eq!(pick("ruby"), BackendKind::LocalVm);
    }

    #[test]
    fn test_fallback_table_has_depth_one() {
        let py = Language::Python;
        let js = Language::JavaScript;

        assert_eq!(
            SelectionPolicy::fallback_for(BackendKind::Microsandbox, FallbackReason::Unavailable, &js),
            Some(BackendKind::LocalVm)
        );
        assert_eq!(
            SelectionPolicy::fallback_for(BackendKind::Microsandbox, FallbackReason::Unavailable, &py),
            Some(BackendKind::LocalProcess)
        );
        assert_eq!(
            SelectionPolicy::fallback_for(BackendKind::BatchCluster, FallbackReason::Unwired, &py),
            Some(BackendKind::LocalProcess)
        );
        assert_eq!(
            SelectionPolicy::fallback_for(BackendKind::BatchCluster, FallbackReason::Unavailable, &py),
            None
        );
        for local in [BackendKind::LocalVm, BackendKind::LocalProcess] {
            for reason in [FallbackReason::Unavailable, FallbackReason::Unwired] {
                assert_eq!(SelectionPolicy::fallback_for(local, reason, &py), None);
            }
        }
    }
}
