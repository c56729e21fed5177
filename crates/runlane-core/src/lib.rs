//! Backend dispatch for untrusted code execution.
//!
//! A caller hands the orchestrator an `ExecutionRequest` (language, source,
//! input payload, constraints) and always gets an `ExecutionResult` back.
//! Between the two the crate picks a backend, falls back at most once, runs
//! the code synchronously or as a polled remote job, and folds whatever the
//! backend produced into one result shape with a fixed error taxonomy.
//!
//! # Architecture Overview
//!
//! - **Selection**: a deterministic policy over the request and an availability snapshot
//! - **Backends**: the adapter contract plus local, microsandbox, WASM and batch-cluster adapters
//! - **Job lifecycle**: submit, poll on an interval, fetch, with a hard wall-clock budget
//! - **Normalization**: raw output and adapter errors mapped onto `ExecutionResult`
//! - **Configuration**: YAML with serde defaults, environment overrides and a builder

pub mod backends;
pub mod config;
pub mod core_types;
pub mod errors;
pub mod lifecycle;
pub mod normalizer;
pub mod orchestrator;
pub mod selection;

pub use backends::{
    Adapter, AsyncBackend, BackendDescriptor, BackendRegistry, RawOutput, RemoteJobState,
    SyncBackend,
};
pub use config::*;
pub use core_types::{
    BackendKind, BackendOverride, ExecutionConstraints, ExecutionError, ExecutionRequest,
    ExecutionResult, Language, ResourceHints, ResultMetadata,
};
pub use errors::{BackendError, ExecutionErrorKind, RunlaneError};
pub use lifecycle::{Job, JobLifecycleManager, JobState};
pub use orchestrator::Orchestrator;
pub use selection::SelectionPolicy;

#[cfg(test)]
pub mod test_utils;
