//! Test case isolation.
//!
//! Parts of xdb keep synchronization state in process-wide statics (the
//! platform futex shim, page-state tracking). Running several test cases
//! as threads of one process lets that state leak from one case into the
//! next, so stages that exercise it run every case in a fresh process.
//!
//! The policy is fixed when the stage is defined; it is never inferred
//! from what the tests do at run time.

mod listing;

pub use listing::parse_test_list;

use crate::cancellation::CancellationToken;
use crate::core::{ExitInfo, StageOutcome};
use crate::errors::VerifyError;
use crate::stages::{run_process, ProcessOutcome, ProcessRequest, Stage, StageResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// How the test cases of a stage share processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationPolicy {
    /// Run the tool once; the test harness may use threads.
    #[default]
    None,
    /// Run each test case in its own process.
    PerTestProcess,
}

const LIST_ARGS: &[&str] = &["--list", "--format", "terse"];

/// Lists the stage's test cases and runs each one in its own process.
///
/// Every case runs even after an earlier one fails; the stage fails if any
/// case failed and the failing names end up in the result detail.
///
/// # Errors
///
/// Propagates provisioning and interrupt errors from the process layer.
pub async fn run_per_test_process(
    subproject: &str,
    stage: &Stage,
    cwd: &Path,
    cancel: &CancellationToken,
) -> Result<StageResult, VerifyError> {
    let started = Utc::now();
    let label = format!("{subproject}/{}", stage.name);
    let required = stage.is_required();

    let list_command = stage.command.with_harness_args(LIST_ARGS);
    let listing = run_process(
        ProcessRequest {
            stage: &label,
            command: &list_command,
            cwd,
            limit: None,
            capture_stdout: true,
        },
        cancel,
    )
    .await?;

    let stdout = match listing {
        ProcessOutcome::Exited { exit, stdout } if exit.success() => stdout.unwrap_or_default(),
        ProcessOutcome::Exited { exit, .. } => {
            warn!(stage = %label, %exit, "listing test cases failed");
            let result = StageResult::from_exit(subproject, &stage.name, required, exit, started);
            return Ok(result.with_detail("listing test cases failed"));
        }
        ProcessOutcome::TimedOut => {
            return Ok(StageResult::timed_out(subproject, &stage.name, required, started));
        }
    };

    let cases = parse_test_list(&stdout);
    if cases.is_empty() {
        let exit = ExitInfo::code(0);
        let result = StageResult::from_exit(subproject, &stage.name, required, exit, started);
        return Ok(result.with_detail("no test cases listed"));
    }

    info!(stage = %label, cases = cases.len(), "running test cases in isolated processes");

    let mut failed = Vec::new();
    let mut last_exit = ExitInfo::code(0);
    for case in &cases {
        let case_command = stage.command.with_harness_args(&["--exact", case.as_str()]);
        let outcome = run_process(
            ProcessRequest {
                stage: &label,
                command: &case_command,
                cwd,
                limit: None,
                capture_stdout: false,
            },
            cancel,
        )
        .await?;

        if let ProcessOutcome::Exited { exit, .. } = outcome {
            if !exit.success() {
                warn!(stage = %label, case = %case, %exit, "test case failed");
                failed.push(case.clone());
                last_exit = exit;
            }
        }
    }

    let result = StageResult::from_exit(subproject, &stage.name, required, last_exit, started);
    if failed.is_empty() {
        let detail = format!("{} cases, each in its own process", cases.len());
        Ok(result.with_detail(detail))
    } else {
        Ok(result
            .with_outcome(StageOutcome::Failure)
            .with_detail(format!(
                "{} of {} cases failed: {}",
                failed.len(),
                cases.len(),
                failed.join(", ")
            )))
    }
}
