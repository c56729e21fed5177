//! Folds raw backend output and adapter errors into `ExecutionResult`.
//!
//! Normalization never fails: a payload that does not parse degrades to its
//! trimmed text, and every `BackendError` lands on a taxonomy kind.

use serde_json::Value;
use std::time::Duration;

use crate::backends::RawOutput;
use crate::core_types::{BackendKind, ExecutionError, ExecutionResult, ResultMetadata};
use crate::errors::{BackendError, ExecutionErrorKind};

/// Per-call context the normalizer stamps onto every result.
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub backend: BackendKind,
    pub elapsed: Duration,
    pub job_id: Option<String>,
}

impl NormalizeContext {
    pub fn new(backend: BackendKind, elapsed: Duration) -> Self {
        Self {
            backend,
            elapsed,
            job_id: None,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    fn metadata(&self, exit_code: Option<i32>, stderr: &str) -> ResultMetadata {
        let mut metadata = ResultMetadata::new(self.backend, self.elapsed.as_millis() as u64);
        metadata.job_id = self.job_id.clone();
        metadata.exit_code = exit_code;
        if !stderr.trim().is_empty() {
            metadata.stderr = Some(stderr.trim().to_string());
        }
        metadata
    }
}

pub struct ResultNormalizer;

impl ResultNormalizer {
    /// Structured data when stdout holds a JSON object or array, otherwise
    /// the trimmed text. Bare scalars stay text so `"42\n"` yields `"42"`.
    pub fn parse_stdout(stdout: &str) -> Value {
        let trimmed = stdout.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                return value;
            }
        }
        Value::String(trimmed.to_string())
    }

    pub fn from_output(ctx: &NormalizeContext, raw: RawOutput) -> ExecutionResult {
        let metadata = ctx.metadata(raw.exit_code, &raw.stderr);

        match raw.exit_code {
            Some(code) if code != 0 => {
                let details = if raw.stderr.trim().is_empty() {
                    raw.stdout.trim().to_string()
                } else {
                    raw.stderr.trim().to_string()
                };
                ExecutionResult::failed(
                    ExecutionError {
                        kind: ExecutionErrorKind::ExecutionError,
                        message: format!("Process exited with code {}", code),
                        backend_id: ctx.backend,
                        job_id: ctx.job_id.clone(),
                        details: (!details.is_empty()).then_some(details),
                    },
                    metadata,
                )
            }
            _ => ExecutionResult::succeeded(Self::parse_stdout(&raw.stdout), metadata),
        }
    }

    /// `remediation` is attached as details for `NOT_AVAILABLE` when the
    /// error does not carry its own.
    pub fn from_error(
        ctx: &NormalizeContext,
        error: BackendError,
        remediation: Option<String>,
    ) -> ExecutionResult {
        let kind = error.kind();
        let message = error.to_string();
        let (exit_code, job_id, details) = match error {
            BackendError::Unavailable { remediation: own, .. } => {
                let text = if own.trim().is_empty() {
                    remediation.unwrap_or_default()
                } else {
                    own
                };
                (None, ctx.job_id.clone(), Some(text))
            }
            BackendError::ProcessFailed { exit_code, stderr, .. } => {
                (exit_code, ctx.job_id.clone(), Some(stderr.trim().to_string()))
            }
            BackendError::JobFailed { job_id, .. } => (None, Some(job_id), None),
            BackendError::Io(original) | BackendError::Internal(original) => {
                (None, ctx.job_id.clone(), Some(original))
            }
            _ => (None, ctx.job_id.clone(), None),
        };

        let mut metadata = ctx.metadata(exit_code, "");
        metadata.job_id = job_id.clone();

        ExecutionResult::failed(
            ExecutionError {
                kind,
                message,
                backend_id: ctx.backend,
                job_id,
                details: details.filter(|d| !d.is_empty()),
            },
            metadata,
        )
    }

    /// Failure that originates in the orchestrator rather than an adapter.
    pub fn failure(
        ctx: &NormalizeContext,
        kind: ExecutionErrorKind,
        message: impl Into<String>,
        details: Option<String>,
    ) -> ExecutionResult {
        ExecutionResult::failed(
            ExecutionError {
                kind,
                message: message.into(),
                backend_id: ctx.backend,
                job_id: ctx.job_id.clone(),
                details,
            },
            ctx.metadata(None, ""),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> NormalizeContext {
        NormalizeContext::new(BackendKind::Microsandbox, Duration::from_millis(12))
    }

    #[test]
    fn test_json_object_stdout_becomes_structured_output() {
        let result = ResultNormalizer::from_output(&ctx(), RawOutput::from_stdout("{\"result\":42}\n"));

        assert!(result.success);
        assert_eq!(result.output, Some(json!({"result": 42})));
        assert_eq!(result.metadata.exit_code, Some(0));
        assert_eq!(result.metadata.duration_ms, 12);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_malformed_payload_degrades_to_trimmed_text() {
        let result = ResultNormalizer::from_output(&ctx(), RawOutput::from_stdout("  {\"result\": 4\n"));
        assert_eq!(result.output, Some(json!("{\"result\": 4")));

        let scalar = ResultNormalizer::from_output(&ctx(), RawOutput::from_stdout("42\n"));
        assert_eq!(scalar.output, Some(json!("42")));
    }

    #[test]
    fn test_non_zero_exit_is_execution_error_with_stderr_details() {
        let raw = RawOutput {
            stdout: String::new(),
            stderr: "Traceback: ZeroDivisionError\n".to_string(),
            exit_code: Some(1),
        };
        let result = ResultNormalizer::from_output(&ctx(), raw);

        assert!(!result.success);
        assert!(result.output.is_none());
        let error = result.error.unwrap();
        assert_eq!(error.kind, ExecutionErrorKind::ExecutionError);
        assert_eq!(error.details.as_deref(), Some("Traceback: ZeroDivisionError"));
        assert_eq!(result.metadata.exit_code, Some(1));
    }

    #[test]
    fn test_unavailable_carries_remediation() {
        let error = BackendError::Unavailable {
            reason: "cluster client missing".to_string(),
            remediation: String::new(),
        };
        let result = ResultNormalizer::from_error(&ctx(), error, Some("install it".to_string()));

        let error = result.error.unwrap();
        assert_eq!(error.kind, ExecutionErrorKind::NotAvailable);
        assert_eq!(error.details.as_deref(), Some("install it"));
    }

    #[test]
    fn test_job_failure_keeps_job_id() {
        let error = BackendError::JobFailed {
            job_id: "job-9".to_string(),
            message: "OOMKilled".to_string(),
        };
        let result = ResultNormalizer::from_error(&ctx(), error, None);

        let error = result.error.unwrap();
        assert_eq!(error.kind, ExecutionErrorKind::JobFailed);
        assert_eq!(error.job_id.as_deref(), Some("job-9"));
        assert!(error.message.contains("OOMKilled"));
        assert_eq!(result.metadata.job_id.as_deref(), Some("job-9"));
    }

    #[test]
    fn test_internal_error_preserves_original_message() {
        let result = ResultNormalizer::from_error(
            &ctx(),
            BackendError::Internal("socket closed".to_string()),
            None,
        );
        let error = result.error.unwrap();
        assert_eq!(error.kind, ExecutionErrorKind::ExecutionError);
        assert_eq!(error.details.as_deref(), Some("socket closed"));
    }
}
