//! The stage runner: executes one stage and classifies its outcome.

use super::{run_process, ProcessOutcome, ProcessRequest, Stage, StageResult};
use crate::cancellation::CancellationToken;
use crate::errors::VerifyError;
use crate::isolation::{self, IsolationPolicy};
use async_trait::async_trait;
use chrono::Utc;
use std::fmt::Debug;
use std::path::Path;

/// Executes stages.
///
/// The sequencer only talks to this trait, so tests can substitute a
/// scripted executor for real tool processes.
#[async_trait]
pub trait StageExecutor: Send + Sync + Debug {
    /// Runs `stage` in `cwd` and returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Provisioning`] when the tool cannot be
    /// launched and [`VerifyError::Interrupted`] when `cancel` fires while
    /// the tool runs. A tool that runs and fails is not an error.
    async fn execute(
        &self,
        subproject: &str,
        stage: &Stage,
        cwd: &Path,
        cancel: &CancellationToken,
    ) -> Result<StageResult, VerifyError>;
}

/// Runs stages as real child processes with inherited output streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageExecutor for ProcessRunner {
    async fn execute(
        &self,
        subproject: &str,
        stage: &Stage,
        cwd: &Path,
        cancel: &CancellationToken,
    ) -> Result<StageResult, VerifyError> {
        match stage.isolation {
            IsolationPolicy::PerTestProcess => {
                isolation::run_per_test_process(subproject, stage, cwd, cancel).await
            }
            IsolationPolicy::None => {
                let started = Utc::now();
                let label = format!("{subproject}/{}", stage.name);
                let outcome = run_process(
                    ProcessRequest {
                        stage: &label,
                        command: &stage.command,
                        cwd,
                        limit: None,
                        capture_stdout: false,
                    },
                    cancel,
                )
                .await?;

                Ok(match outcome {
                    ProcessOutcome::Exited { exit, .. } => StageResult::from_exit(
                        subproject,
                        &stage.name,
                        stage.is_required(),
                        exit,
                        started,
                    ),
                    ProcessOutcome::TimedOut => StageResult::timed_out(
                        subproject,
                        &stage.name,
                        stage.is_required(),
                        started,
                    ),
                })
            }
        }
    }
}
