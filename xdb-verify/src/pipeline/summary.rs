//! Final status and summary of one pipeline invocation.

use crate::errors::VerifyError;
use crate::stages::StageResult;
use serde::{Deserialize, Serialize};

/// Aggregate status of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinalStatus {
    /// Every required stage and every fuzz target passed.
    Passed,
    /// A required stage reported a defect; the pipeline stopped there.
    DefectFailure {
        /// `subproject/stage` label of the failing stage.
        stage: String,
    },
    /// One or more fuzz targets failed. The campaign still ran to the end.
    FuzzFailures {
        /// Names of the failing targets.
        targets: Vec<String>,
    },
    /// The toolchain or environment is broken; no verdict on the code.
    ProvisioningFailure {
        /// What was missing or unusable.
        message: String,
    },
    /// The operator aborted the run.
    Interrupted {
        /// Stage that was running.
        stage: String,
        /// Cancellation reason.
        reason: String,
    },
}

impl FinalStatus {
    /// Classifies an orchestrator error.
    #[must_use]
    pub fn from_error(err: &VerifyError) -> Self {
        match err {
            VerifyError::Interrupted { stage, reason } => Self::Interrupted {
                stage: stage.clone(),
                reason: reason.clone(),
            },
            other => Self::ProvisioningFailure {
                message: other.to_string(),
            },
        }
    }

    /// Returns true if the run passed.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Process exit code for this status.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Passed => 0,
            Self::DefectFailure { .. } | Self::FuzzFailures { .. } => 1,
            Self::ProvisioningFailure { .. } => 2,
            Self::Interrupted { .. } => 130,
        }
    }
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::DefectFailure { stage } => write!(f, "FAILED at {stage}"),
            Self::FuzzFailures { targets } => {
                write!(f, "FAILED: fuzz targets {}", targets.join(", "))
            }
            Self::ProvisioningFailure { message } => {
                write!(f, "PROVISIONING FAILURE (environment, not code): {message}")
            }
            Self::Interrupted { stage, reason } => {
                write!(f, "INTERRUPTED during {stage}: {reason}")
            }
        }
    }
}

/// Everything one invocation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Run identifier.
    pub run_id: String,
    /// Results of sequenced stages, in execution order.
    pub results: Vec<StageResult>,
    /// Fuzz targets discovered for the campaign.
    #[serde(default)]
    pub fuzz_targets: Vec<String>,
    /// Results of fuzz target runs, in execution order.
    #[serde(default)]
    pub fuzz_results: Vec<StageResult>,
    /// Aggregate status.
    #[serde(flatten)]
    pub status: FinalStatus,
}

impl PipelineReport {
    /// Creates a report from sequenced stage results.
    #[must_use]
    pub fn new(run_id: impl Into<String>, results: Vec<StageResult>, status: FinalStatus) -> Self {
        Self {
            run_id: run_id.into(),
            results,
            fuzz_targets: Vec::new(),
            fuzz_results: Vec::new(),
            status,
        }
    }

    /// Merges a finished fuzz campaign into the report.
    #[must_use]
    pub fn with_campaign(mut self, campaign: crate::fuzz::CampaignReport) -> Self {
        self.fuzz_targets = campaign.targets;
        self.fuzz_results = campaign.results;

        if let Some(halt) = campaign.halted {
            self.status = halt;
        } else if self.status.is_passed() {
            let failed: Vec<String> = self
                .fuzz_results
                .iter()
                .filter(|r| r.is_failure())
                .map(|r| r.name.clone())
                .collect();
            if !failed.is_empty() {
                self.status = FinalStatus::FuzzFailures { targets: failed };
            }
        }
        self
    }

    /// Process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    /// Failures of tolerated stages.
    pub fn tolerated_failures(&self) -> impl Iterator<Item = &StageResult> {
        self.results
            .iter()
            .filter(|r| r.is_failure() && !r.required)
    }

    /// One line per result followed by the aggregate line.
    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .results
            .iter()
            .chain(self.fuzz_results.iter())
            .map(|r| {
                let mut line = format!("{:<28} {}", r.label(), r.outcome);
                if r.is_failure() && !r.required {
                    line.push_str(" [tolerated]");
                }
                if r.timed_out {
                    line.push_str(" [timed out]");
                }
                if let Some(exit) = r.exit {
                    if !exit.success() {
                        line.push_str(&format!(" ({exit})"));
                    }
                }
                if let Some(detail) = &r.detail {
                    line.push_str(&format!(" - {detail}"));
                }
                line
            })
            .collect();
        lines.push(self.summary_line());
        lines
    }

    fn count(&self, pred: impl Fn(&StageResult) -> bool) -> usize {
        self.results.iter().filter(|r| pred(r)).count()
    }

    /// The final aggregate line.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let succeeded = self.count(StageResult::is_success);
        let tolerated = self.tolerated_failures().count();
        let skipped = self.count(|r| r.outcome.is_skipped());
        let fuzz_failed = self.fuzz_results.iter().filter(|r| r.is_failure()).count();

        format!(
            "verification {}: {succeeded} stages succeeded, {tolerated} tolerated failures, \
             {skipped} skipped; fuzz: {} targets run, {fuzz_failed} failed",
            self.status,
            self.fuzz_results.len(),
        )
    }
}
