//! Scriptable fake backends for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::backends::{
    AsyncBackend, BackendDescriptor, RawOutput, RemoteJobState, SandboxProvider, SandboxSession,
    SandboxSpec, SyncBackend,
};
use crate::core_types::{BackendKind, ExecutionRequest};
use crate::errors::BackendError;

#[derive(Clone)]
pub enum SyncBehavior {
    Output(RawOutput),
    Fail(BackendError),
    /// Never returns, even when cancelled.
    Hang,
}

/// Synchronous backend with scripted availability and outcome.
pub struct FakeSyncBackend {
    descriptor: BackendDescriptor,
    available: bool,
    wired: bool,
    behavior: SyncBehavior,
    runs: AtomicUsize,
    checks: AtomicUsize,
}

impl FakeSyncBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            descriptor: BackendDescriptor::defaults_for(kind),
            available: true,
            wired: true,
            behavior: SyncBehavior::Output(RawOutput::from_stdout("ok")),
            runs: AtomicUsize::new(0),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn unwired(mut self) -> Self {
        self.wired = false;
        self
    }

    pub fn with_stdout(mut self, stdout: &str) -> Self {
        self.behavior = SyncBehavior::Output(RawOutput::from_stdout(stdout));
        self
    }

    pub fn with_behavior(mut self, behavior: SyncBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_max_single_run_ms(mut self, max_ms: u64) -> Self {
        self.descriptor.max_single_run_ms = max_ms;
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncBackend for FakeSyncBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn check_available(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.available
    }

    fn remediation(&self) -> String {
        format!("enable {}", self.descriptor.id)
    }

    fn is_wired(&self) -> bool {
        self.wired
    }

    async fn run_sync(
        &self,
        _request: &ExecutionRequest,
        _budget: Duration,
        _cancel: &CancellationToken,
    ) -> Result<RawOutput, BackendError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            SyncBehavior::Output(raw) => Ok(raw.clone()),
            SyncBehavior::Fail(error) => Err(error.clone()),
            SyncBehavior::Hang => std::future::pending().await,
        }
    }
}

/// Asynchronous backend that replays a fixed sequence of remote states.
/// Once the script runs out the last state repeats.
pub struct ScriptedJobBackend {
    descriptor: BackendDescriptor,
    available: bool,
    script: Mutex<VecDeque<RemoteJobState>>,
    last: Mutex<RemoteJobState>,
    status_errors: AtomicUsize,
    output: String,
    fail_submit: bool,
    status_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
}

impl ScriptedJobBackend {
    pub fn new(script: Vec<RemoteJobState>) -> Self {
        Self {
            descriptor: BackendDescriptor::defaults_for(BackendKind::BatchCluster),
            available: true,
            script: Mutex::new(script.into()),
            last: Mutex::new(RemoteJobState::Running),
            status_errors: AtomicUsize::new(0),
            output: String::new(),
            fail_submit: false,
            status_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
        }
    }

    pub fn always_running() -> Self {
        Self::new(vec![RemoteJobState::Running])
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = output.to_string();
        self
    }

    /// The first `count` status checks fail at the transport level.
    pub fn with_status_errors(self, count: usize) -> Self {
        self.status_errors.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_submit(mut self) -> Self {
        self.fail_submit = true;
        self
    }

    pub fn with_max_single_run_ms(mut self, max_ms: u64) -> Self {
        self.descriptor.max_single_run_ms = max_ms;
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AsyncBackend for ScriptedJobBackend {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn check_available(&self) -> bool {
        self.available
    }

    fn remediation(&self) -> String {
        "configure the scripted cluster".to_string()
    }

    async fn submit(&self, _request: &ExecutionRequest) -> Result<String, BackendError> {
        if self.fail_submit {
            return Err(BackendError::Internal("queue rejected job".to_string()));
        }
        Ok("scripted-job".to_string())
    }

    async fn get_status(&self, _job_id: &str) -> Result<RemoteJobState, BackendError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let pending_errors = self.status_errors.load(Ordering::SeqCst);
        if pending_errors > 0 {
            self.status_errors.store(pending_errors - 1, Ordering::SeqCst);
            return Err(BackendError::Io("connection reset".to_string()));
        }

        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(next) = script.pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }

    async fn fetch_result(&self, _job_id: &str) -> Result<RawOutput, BackendError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(RawOutput {
            stdout: self.output.clone(),
            stderr: String::new(),
            exit_code: None,
        })
    }

    async fn cancel(&self, _job_id: &str) -> Result<(), BackendError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sandbox provider whose processes never finish. Counts releases.
#[derive(Default)]
pub struct HangingSandboxProvider {
    pub releases: Arc<AtomicUsize>,
}

struct HangingSession {
    releases: Arc<AtomicUsize>,
}

#[async_trait]
impl SandboxProvider for HangingSandboxProvider {
    async fn is_reachable(&self) -> bool {
        true
    }

    async fn acquire(&self, _spec: &SandboxSpec) -> Result<Box<dyn SandboxSession>, BackendError> {
        Ok(Box::new(HangingSession {
            releases: self.releases.clone(),
        }))
    }
}

#[async_trait]
impl SandboxSession for HangingSession {
    fn id(&self) -> &str {
        "hanging-sandbox"
    }

    async fn write_file(&self, _path: &str, _contents: &[u8]) -> Result<(), BackendError> {
        Ok(())
    }

    async fn run(&self, _program: &str, _args: &[String]) -> Result<RawOutput, BackendError> {
        std::future::pending().await
    }

    async fn release(&self) -> Result<(), BackendError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
