//! Error types for backend dispatch and orchestration
//!
//! Two layers of failure live here. `BackendError` is what an adapter hands
//! back when a run goes wrong; the result normalizer folds it into the
//! canonical `ExecutionErrorKind` taxonomy that callers see. `RunlaneError`
//! covers failures of the core itself (configuration, composition, lifecycle
//! misuse) and is only surfaced from constructors and loaders, never from
//! `Orchestrator::execute`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RunlaneError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Job lifecycle error: {0}")]
    LifecycleError(String),
}

impl From<std::io::Error> for RunlaneError {
    fn from(err: std::io::Error) -> Self {
        RunlaneError::IoError(err.to_string())
    }
}

impl From<serde_yaml::Error> for RunlaneError {
    fn from(err: serde_yaml::Error) -> Self {
        RunlaneError::ConfigError(err.to_string())
    }
}

// Errors reported by a backend adapter
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("Backend is not available: {reason}")]
    Unavailable { reason: String, remediation: String },
    #[error("Backend is not implemented yet")]
    NotImplemented,
    #[error("Process exited with code {exit_code:?}:\nStdout: {stdout}\nStderr: {stderr}")]
    ProcessFailed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("Remote job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },
    #[error("Execution timed out")]
    Timeout,
    #[error("Execution cancelled by caller")]
    Cancelled,
    #[error("Language '{0}' is not supported by this backend")]
    UnsupportedLanguage(String),
    #[error("I/O error during execution: {0}")]
    Io(String),
    #[error("Backend error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Internal(format!("serialization failed: {}", err))
    }
}

/// Canonical failure categories returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionErrorKind {
    /// Backend environment is misconfigured or unreachable. Fix the
    /// environment, retrying the same request will not help.
    NotAvailable,
    /// Backend exists in the contract but has no working implementation.
    NotImplemented,
    /// User code failed, threw, or exited non-zero.
    ExecutionError,
    /// A remote asynchronous job reported failure.
    JobFailed,
    /// Local budget exceeded. Remote state is unknown.
    Timeout,
    /// No backend can service the requested language.
    UnsupportedLanguage,
    /// The caller aborted the execution.
    Cancelled,
}

impl ExecutionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionErrorKind::NotAvailable => "NOT_AVAILABLE",
            ExecutionErrorKind::NotImplemented => "NOT_IMPLEMENTED",
            ExecutionErrorKind::ExecutionError => "EXECUTION_ERROR",
            ExecutionErrorKind::JobFailed => "JOB_FAILED",
            ExecutionErrorKind::Timeout => "TIMEOUT",
            ExecutionErrorKind::UnsupportedLanguage => "UNSUPPORTED_LANGUAGE",
            ExecutionErrorKind::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BackendError {
    /// Taxonomy kind this adapter error maps onto.
    pub fn kind(&self) -> ExecutionErrorKind {
        match self {
            BackendError::Unavailable { .. } => ExecutionErrorKind::NotAvailable,
            BackendError::NotImplemented => ExecutionErrorKind::NotImplemented,
            BackendError::JobFailed { .. } => ExecutionErrorKind::JobFailed,
            BackendError::Timeout => ExecutionErrorKind::Timeout,
            BackendError::Cancelled => ExecutionErrorKind::Cancelled,
            BackendError::UnsupportedLanguage(_) => ExecutionErrorKind::UnsupportedLanguage,
            BackendError::ProcessFailed { .. } | BackendError::Io(_) | BackendError::Internal(_) => {
                ExecutionErrorKind::ExecutionError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ExecutionErrorKind::UnsupportedLanguage).unwrap();
        assert_eq!(json, "\"UNSUPPORTED_LANGUAGE\"");
        assert_eq!(ExecutionErrorKind::NotAvailable.to_string(), "NOT_AVAILABLE");
    }

    #[test]
    fn test_unmapped_adapter_errors_become_execution_error() {
        assert_eq!(
            BackendError::Internal("boom".to_string()).kind(),
            ExecutionErrorKind::ExecutionError
        );
        assert_eq!(
            BackendError::Io("disk full".to_string()).kind(),
            ExecutionErrorKind::ExecutionError
        );
        assert_eq!(BackendError::Timeout.kind(), ExecutionErrorKind::Timeout);
    }
}
