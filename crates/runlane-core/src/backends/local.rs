// src/backends/local.rs
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tempfile::Builder;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use which::which;

use super::{BackendDescriptor, RawOutput, SyncBackend};
use crate::config::{LocalConfig, LocalRuntimes};
use crate::core_types::{BackendKind, ExecutionRequest, Language};
use crate::errors::BackendError;

/// Environment variable pointing user code at its serialized input.
pub const INPUT_PATH_ENV: &str = "RUNLANE_INPUT_PATH";

/// Runs code in a child process on the host. The same adapter serves both
/// local backends: `LocalVm` for js/ts and `LocalProcess` for python/bash.
pub struct LocalAdapter {
    descriptor: BackendDescriptor,
    runtimes: LocalRuntimes,
    work_dir: Option<PathBuf>,
}

impl LocalAdapter {
    pub fn new(descriptor: BackendDescriptor, local: &LocalConfig) -> Self {
        debug_assert!(descriptor.id.is_local());
        Self {
            descriptor,
            runtimes: local.runtimes.clone(),
            work_dir: local.work_dir.clone(),
        }
    }

    pub fn vm(local: &LocalConfig) -> Self {
        Self::new(BackendDescriptor::defaults_for(BackendKind::LocalVm), local)
    }

    pub fn process(local: &LocalConfig) -> Self {
        Self::new(BackendDescriptor::defaults_for(BackendKind::LocalProcess), local)
    }

    fn interpreters(&self) -> Vec<String> {
        let mut programs: Vec<String> = self
            .descriptor
            .supports_languages
            .iter()
            .filter_map(|language| self.runtimes.command_for(language))
            .filter_map(|command| command.first().cloned())
            .collect();
        programs.sort();
        programs.dedup();
        programs
    }

    fn command_for(&self, language: &Language) -> Result<&[String], BackendError> {
        if !self.descriptor.supports(language) {
            return Err(BackendError::UnsupportedLanguage(language.to_string()));
        }
        match self.runtimes.command_for(language) {
            Some(command) if !command.is_empty() => Ok(command),
            _ => Err(BackendError::UnsupportedLanguage(language.to_string())),
        }
    }
}

#[async_trait]
impl SyncBackend for LocalAdapter {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    async fn check_available(&self) -> bool {
        let missing: Vec<String> = self
            .interpreters()
            .into_iter()
            .filter(|program| which(program).is_err())
            .collect();

        if !missing.is_empty() {
            log::debug!(
                "{} unavailable, interpreters not found: {}",
                self.descriptor.id,
                missing.join(", ")
            );
        }
        missing.is_empty()
    }

    fn remediation(&self) -> String {
        format!(
            "Install {} and make sure it is on PATH, or point local.runtimes at an existing interpreter",
            self.interpreters().join(" and ")
        )
    }

    async fn run_sync(
        &self,
        request: &ExecutionRequest,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<RawOutput, BackendError> {
        let command = self.command_for(&request.language)?;

        let builder = {
            let mut builder = Builder::new();
            builder.prefix("runlane-");
            builder
        };
        let temp_dir = match &self.work_dir {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        let script_path = temp_dir
            .path()
            .join(format!("main.{}", request.language.file_extension()));
        let input_path = temp_dir.path().join("input.json");
        let input = serde_json::to_vec(&request.input_payload)?;

        fs::write(&script_path, request.source_code.as_bytes()).await?;
        fs::write(&input_path, &input).await?;

        let mut child = Command::new(&command[0])
            .args(&command[1..])
            .arg(&script_path)
            .current_dir(temp_dir.path())
            .env(INPUT_PATH_ENV, &input_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // Code that never reads stdin must not stall on a full pipe.
            tokio::spawn(async move {
                let _ = stdin.write_all(&input).await;
            });
        }

        log::debug!(
            "{} started {} (budget {:?})",
            self.descriptor.id,
            command[0],
            budget
        );

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            res = child.wait_with_output() => res?,
            _ = tokio::time::sleep(budget) => {
                log::warn!("Local execution timed out after {:?}", budget);
                return Err(BackendError::Timeout);
            }
            _ = cancel.cancelled() => {
                log::info!("Local execution cancelled by caller");
                return Err(BackendError::Cancelled);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        // No exit code means the process was killed by a signal.
        if output.status.code().is_none() && !output.status.success() {
            let reason = termination_reason(&output.status);
            log::warn!("{} process {}", self.descriptor.id, reason);
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("process {}", reason));
            return Err(BackendError::ProcessFailed {
                exit_code: None,
                stdout,
                stderr,
            });
        }

        Ok(RawOutput {
            stdout,
            stderr,
            exit_code: output.status.code(),
        })
    }
}

#[cfg(unix)]
fn termination_reason(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("killed by signal {}", signal),
        None => "terminated without an exit code".to_string(),
    }
}

#[cfg(not(unix))]
fn termination_reason(_status: &ExitStatus) -> String {
    "terminated without an exit code".to_string()
}
