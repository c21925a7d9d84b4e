//! Scripted stage executor.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::cancellation::CancellationToken;
use crate::core::ExitInfo;
use crate::errors::VerifyError;
use crate::stages::{Stage, StageExecutor, StageResult};

/// What a scripted stage does when executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// Exits with the given code.
    Exit(i32),
    /// Overruns its limit and is killed.
    TimedOut,
    /// Cannot be launched.
    Missing,
    /// Cancels the run token with the reason while running.
    Interrupt(String),
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// `subproject/stage`.
    pub label: String,
    /// Directory the stage was asked to run in.
    pub cwd: PathBuf,
    /// The process working directory at the time of the call.
    pub process_cwd: Option<PathBuf>,
}

/// A stage executor that plays back scripted outcomes.
///
/// Stages without a script exit 0.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script: Mutex<HashMap<String, Scripted>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedExecutor {
    /// Creates an executor where every stage succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the stage with the given `subproject/stage` label.
    #[must_use]
    pub fn on(self, label: impl Into<String>, behaviour: Scripted) -> Self {
        self.script.lock().insert(label.into(), behaviour);
        self
    }

    /// Every call so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    /// The labels of every call so far, in order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.invocations
            .lock()
            .iter()
            .map(|i| i.label.clone())
            .collect()
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.invocations.lock().len()
    }
}

#[async_trait]
impl StageExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        subproject: &str,
        stage: &Stage,
        cwd: &Path,
        cancel: &CancellationToken,
    ) -> Result<StageResult, VerifyError> {
        let label = format!("{subproject}/{}", stage.name);
        self.invocations.lock().push(Invocation {
            label: label.clone(),
            cwd: cwd.to_path_buf(),
            process_cwd: std::env::current_dir().ok(),
        });

        let behaviour = self
            .script
            .lock()
            .get(&label)
            .cloned()
            .unwrap_or(Scripted::Exit(0));
        let started = Utc::now();
        let required = stage.is_required();

        match behaviour {
            Scripted::Exit(code) => Ok(StageResult::from_exit(
                subproject,
                &stage.name,
                required,
                ExitInfo::code(code),
                started,
            )),
            Scripted::TimedOut => {
                Ok(StageResult::timed_out(subproject, &stage.name, required, started))
            }
            Scripted::Missing => Err(VerifyError::Provisioning {
                stage: label,
                program: stage.command.program.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            Scripted::Interrupt(reason) => {
                cancel.cancel(reason.clone());
                Err(VerifyError::Interrupted {
                    stage: label,
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StageKind, StageOutcome};
    use crate::stages::CommandSpec;

    #[tokio::test]
    async fn test_scripted_outcomes() {
        let executor = ScriptedExecutor::new()
            .on("xdb/fmt", Scripted::Exit(1))
            .on("xdb/miri", Scripted::Missing);
        let cancel = CancellationToken::new();
        let stage = |name: &str| Stage::new(name, StageKind::Lint, CommandSpec::cargo([name]));

        let ok = executor
            .execute("xdb", &stage("clippy"), Path::new("."), &cancel)
            .await
            .unwrap();
        assert_eq!(ok.outcome, StageOutcome::Success);

        let bad = executor
            .execute("xdb", &stage("fmt"), Path::new("."), &cancel)
            .await
            .unwrap();
        assert_eq!(bad.outcome, StageOutcome::Failure);

        let err = executor
            .execute("xdb", &stage("miri"), Path::new("."), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_provisioning());

        assert_eq!(executor.labels(), vec!["xdb/clippy", "xdb/fmt", "xdb/miri"]);
    }

    #[tokio::test]
    async fn test_interrupt_cancels_token() {
        let executor = ScriptedExecutor::new().on("xdb/test", Scripted::Interrupt("SIGINT".into()));
        let cancel = CancellationToken::new();
        let stage = Stage::new("test", StageKind::Test, CommandSpec::cargo(["test"]));

        let err = executor
            .execute("xdb", &stage, Path::new("."), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_interrupt());
        assert!(cancel.is_cancelled());
        assert_eq!(cancel.reason().as_deref(), Some("SIGINT"));
    }
}
