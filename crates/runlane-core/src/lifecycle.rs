//! Job lifecycle for asynchronous backends.
//!
//! A `Job` is the local record of one remote execution. The manager submits
//! it, then polls the backend on a fixed interval until the backend reports a
//! terminal state, the wall-clock budget runs out, or the caller cancels.
//!
//! ```text
//! Submitted ──► Polling ──┬──► Completed
//!                 ▲   │   ├──► Failed
//!                 └───┘   ├──► TimedOut   (local budget; remote job keeps running)
//!                         └──► Cancelled  (caller abort; best-effort remote cancel)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::backends::{AsyncBackend, RawOutput, RemoteJobState};
use crate::core_types::{BackendKind, ExecutionRequest, ExecutionResult};
use crate::errors::{BackendError, ExecutionErrorKind, RunlaneError};
use crate::normalizer::{NormalizeContext, ResultNormalizer};

/// Reference poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5_000);

/// Upper bound on the best-effort remote cancel issued after a caller abort.
const REMOTE_CANCEL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Submitted,
    Polling,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::TimedOut | JobState::Cancelled
        )
    }

    fn can_advance_to(&self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Submitted, JobState::Polling) => true,
            (JobState::Polling, JobState::Polling)
            | (JobState::Polling, JobState::Completed)
            | (JobState::Polling, JobState::Failed)
            | (JobState::Polling, JobState::TimedOut)
            | (JobState::Polling, JobState::Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Submitted => write!(f, "submitted"),
            JobState::Polling => write!(f, "polling"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::TimedOut => write!(f, "timed_out"),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Local tracking record for one asynchronous execution.
#[derive(Debug, Clone)]
pub struct Job {
    id: String,
    backend: BackendKind,
    state: JobState,
    submitted_at: DateTime<Utc>,
    last_polled_at: Option<DateTime<Utc>>,
    started: Instant,
    polls: u32,
}

impl Job {
    pub fn new(id: impl Into<String>, backend: BackendKind) -> Self {
        Self {
            id: id.into(),
            backend,
            state: JobState::Submitted,
            submitted_at: Utc::now(),
            last_polled_at: None,
            started: Instant::now(),
            polls: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn last_polled_at(&self) -> Option<DateTime<Utc>> {
        self.last_polled_at
    }

    /// Poll attempts so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `next`. A terminal job is never mutated again.
    pub fn advance(&mut self, next: JobState) -> Result<(), RunlaneError> {
        if !self.state.can_advance_to(next) {
            return Err(RunlaneError::LifecycleError(format!(
                "job {} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }
        if next == JobState::Polling {
            self.last_polled_at = Some(Utc::now());
            self.polls += 1;
        }
        self.state = next;
        Ok(())
    }

    fn context(&self) -> NormalizeContext {
        NormalizeContext::new(self.backend, self.elapsed()).with_job_id(self.id.clone())
    }
}

enum Tick {
    Status(Result<RemoteJobState, BackendError>),
    Deadline,
    Cancelled,
}

enum Fetch {
    Done(Result<RawOutput, BackendError>),
    Deadline,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct JobLifecycleManager {
    poll_interval: Duration,
}

impl JobLifecycleManager {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Submit through the adapter. No job exists if this fails.
    pub async fn submit(
        &self,
        backend: &dyn AsyncBackend,
        request: &ExecutionRequest,
    ) -> Result<Job, BackendError> {
        let job_id = backend.submit(request).await?;
        let job = Job::new(job_id, backend.descriptor().id);
        log::info!("Submitted job {} to {}", job.id(), job.backend());
        Ok(job)
    }

    /// Submit and drive to a terminal state. Submission failures surface as
    /// `EXECUTION_ERROR`.
    pub async fn submit_and_run(
        &self,
        backend: &dyn AsyncBackend,
        request: &ExecutionRequest,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let started = Instant::now();
        let submission = tokio::select! {
            res = self.submit(backend, request) => res,
            _ = sleep(budget) => Err(BackendError::Timeout),
            _ = cancel.cancelled() => Err(BackendError::Cancelled),
        };

        match submission {
            Ok(mut job) => {
                let remaining = budget.saturating_sub(started.elapsed());
                self.run(backend, &mut job, remaining, cancel).await
            }
            Err(error) => {
                let ctx = NormalizeContext::new(backend.descriptor().id, started.elapsed());
                let kind = match error {
                    BackendError::Timeout => ExecutionErrorKind::Timeout,
                    BackendError::Cancelled => ExecutionErrorKind::Cancelled,
                    _ => ExecutionErrorKind::ExecutionError,
                };
                log::warn!("Job submission to {} failed: {}", ctx.backend, error);
                ResultNormalizer::failure(
                    &ctx,
                    kind,
                    format!("Job submission failed: {}", error),
                    Some(error.to_string()),
                )
            }
        }
    }

    /// Poll `job` until it reaches a terminal state or `budget` (measured
    /// from submission) runs out.
    pub async fn run(
        &self,
        backend: &dyn AsyncBackend,
        job: &mut Job,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let deadline = job.started + budget;

        loop {
            if let Err(e) = job.advance(JobState::Polling) {
                return self.lifecycle_failure(job, e);
            }

            if Instant::now() >= deadline {
                return self.time_out(job, budget);
            }

            let tick = tokio::select! {
                biased;
                _ = cancel.cancelled() => Tick::Cancelled,
                _ = sleep_until(deadline) => Tick::Deadline,
                status = backend.get_status(job.id()) => Tick::Status(status),
            };

            match tick {
                Tick::Cancelled => return self.cancel(backend, job).await,
                Tick::Deadline => return self.time_out(job, budget),
                Tick::Status(Ok(RemoteJobState::Running)) => {
                    log::debug!("Job {} still running (poll {})", job.id(), job.polls());
                }
                Tick::Status(Ok(RemoteJobState::Completed)) => {
                    return self.complete(backend, job, deadline, budget, cancel).await;
                }
                Tick::Status(Ok(RemoteJobState::Failed { message })) => {
                    return self.fail(job, message);
                }
                Tick::Status(Err(e)) => {
                    log::warn!(
                        "Status check for job {} failed, assuming still running: {}",
                        job.id(),
                        e
                    );
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return self.time_out(job, budget);
            }
            let nap = self.poll_interval.min(deadline - now);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancel(backend, job).await,
                _ = sleep(nap) => {}
            }
        }
    }

    async fn complete(
        &self,
        backend: &dyn AsyncBackend,
        job: &mut Job,
        deadline: Instant,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => Fetch::Cancelled,
            _ = sleep_until(deadline) => Fetch::Deadline,
            res = backend.fetch_result(job.id()) => Fetch::Done(res),
        };

        match fetched {
            Fetch::Cancelled => self.cancel(backend, job).await,
            Fetch::Deadline => self.time_out(job, budget),
            Fetch::Done(Ok(raw)) => {
                if let Err(e) = job.advance(JobState::Completed) {
                    return self.lifecycle_failure(job, e);
                }
                log::info!("Job {} completed after {:?}", job.id(), job.elapsed());
                ResultNormalizer::from_output(&job.context(), raw)
            }
            Fetch::Done(Err(error)) => {
                if let Err(e) = job.advance(JobState::Failed) {
                    return self.lifecycle_failure(job, e);
                }
                log::warn!("Fetching result of job {} failed: {}", job.id(), error);
                let ctx = job.context();
                ResultNormalizer::failure(
                    &ctx,
                    ExecutionErrorKind::ExecutionError,
                    format!("Failed to fetch result of job {}", job.id()),
                    Some(error.to_string()),
                )
            }
        }
    }

    fn fail(&self, job: &mut Job, message: Option<String>) -> ExecutionResult {
        if let Err(e) = job.advance(JobState::Failed) {
            return self.lifecycle_failure(job, e);
        }
        log::info!("Job {} failed remotely", job.id());
        ResultNormalizer::failure(
            &job.context(),
            ExecutionErrorKind::JobFailed,
            format!("Remote job {} failed", job.id()),
            message,
        )
    }

    fn time_out(&self, job: &mut Job, budget: Duration) -> ExecutionResult {
        if let Err(e) = job.advance(JobState::TimedOut) {
            return self.lifecycle_failure(job, e);
        }
        // TODO: issue a best-effort remote cancel once operators decide abandoned jobs should be reclaimed.
        log::warn!(
            "Job {} on {} exceeded its {:?} budget; the remote job is left running",
            job.id(),
            job.backend(),
            budget
        );
        ResultNormalizer::failure(
            &job.context(),
            ExecutionErrorKind::Timeout,
            format!("Job {} did not finish within {} ms", job.id(), budget.as_millis()),
            None,
        )
    }

    async fn cancel(&self, backend: &dyn AsyncBackend, job: &mut Job) -> ExecutionResult {
        if let Err(e) = job.advance(JobState::Cancelled) {
            return self.lifecycle_failure(job, e);
        }
        log::info!("Job {} cancelled by caller", job.id());

        match tokio::time::timeout(REMOTE_CANCEL_GRACE, backend.cancel(job.id())).await {
            Ok(Ok(())) => log::debug!("Remote cancel issued for job {}", job.id()),
            Ok(Err(e)) => log::warn!("Remote cancel of job {} failed: {}", job.id(), e),
            Err(_) => log::warn!("Remote cancel of job {} did not answer in time", job.id()),
        }

        ResultNormalizer::failure(
            &job.context(),
            ExecutionErrorKind::Cancelled,
            format!("Job {} cancelled by caller", job.id()),
            None,
        )
    }

    fn lifecycle_failure(&self, job: &Job, error: RunlaneError) -> ExecutionResult {
        log::error!("{}", error);
        ResultNormalizer::failure(
            &job.context(),
            ExecutionErrorKind::ExecutionError,
            "Job lifecycle violated",
            Some(error.to_string()),
        )
    }
}

impl Default for JobLifecycleManager {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
