//! Fuzz campaign: discover targets, then run each for a fixed budget.

use super::{CampaignSettings, FuzzDriver, FuzzTarget, LeakDetection, FUZZ_SUBPROJECT};
use crate::cancellation::CancellationToken;
use crate::errors::VerifyError;
use crate::events::EventSink;
use crate::pipeline::FinalStatus;
use crate::stages::{run_process, ProcessOutcome, ProcessRequest, StageResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// What a campaign produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    /// Discovered target names, in run order.
    pub targets: Vec<String>,
    /// One result per target that ran to an outcome.
    pub results: Vec<StageResult>,
    /// Set when the campaign stopped early for a provisioning problem or an
    /// interrupt.
    pub halted: Option<FinalStatus>,
}

impl CampaignReport {
    /// Names of the targets whose run failed.
    #[must_use]
    pub fn failed_targets(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.is_failure())
            .map(|r| r.name.as_str())
            .collect()
    }
}

/// Runs every target the driver reports, one after another.
///
/// A failing target never stops the campaign; every target gets its budget.
pub struct FuzzCampaign {
    driver: Arc<dyn FuzzDriver>,
    dir: PathBuf,
    settings: CampaignSettings,
}

impl std::fmt::Debug for FuzzCampaign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuzzCampaign")
            .field("dir", &self.dir)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl FuzzCampaign {
    /// Creates a campaign running the driver's commands in `dir`.
    #[must_use]
    pub fn new(
        driver: Arc<dyn FuzzDriver>,
        dir: impl Into<PathBuf>,
        settings: CampaignSettings,
    ) -> Self {
        Self {
            driver,
            dir: dir.into(),
            settings,
        }
    }

    /// The settings applied to every target.
    #[must_use]
    pub fn settings(&self) -> &CampaignSettings {
        &self.settings
    }

    /// Asks the driver for the current target list.
    ///
    /// Discovery has no side effects, so calling it twice without changes
    /// to the fuzz crate yields the same targets in the same order.
    ///
    /// # Errors
    ///
    /// Returns a provisioning error if the listing cannot be launched or
    /// exits unsuccessfully, and [`VerifyError::Interrupted`] on cancel.
    pub async fn discover(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<FuzzTarget>, VerifyError> {
        let command = self.driver.list_command();
        let stage = format!("{FUZZ_SUBPROJECT}/list");
        let outcome = run_process(
            ProcessRequest {
                stage: &stage,
                command: &command,
                cwd: &self.dir,
                limit: None,
                capture_stdout: true,
            },
            cancel,
        )
        .await?;

        let stdout = match outcome {
            ProcessOutcome::Exited { exit, stdout } if exit.success() => stdout.unwrap_or_default(),
            ProcessOutcome::Exited { exit, .. } => {
                return Err(VerifyError::ToolQuery {
                    command: command.display(),
                    status: exit.to_string(),
                });
            }
            ProcessOutcome::TimedOut => {
                return Err(VerifyError::ToolQuery {
                    command: command.display(),
                    status: "timeout".to_string(),
                });
            }
        };

        let mut seen = BTreeSet::new();
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty() && seen.insert(name.to_string()))
            .map(|name| self.settings.target(name))
            .collect())
    }

    /// Builds, then fuzzes one target.
    ///
    /// The build is untimed. The fuzzing run is killed at the target's own
    /// budget plus the campaign grace and recorded as a timed-out failure.
    /// A target that does not build is a failure without a fuzzing run. New
    /// files in the target's artifact directory are listed in the result
    /// detail as reproducers.
    ///
    /// # Errors
    ///
    /// Returns a provisioning error if the driver cannot be launched and
    /// [`VerifyError::Interrupted`] on cancel.
    pub async fn run_one(
        &self,
        target: &FuzzTarget,
        cancel: &CancellationToken,
    ) -> Result<StageResult, VerifyError> {
        let name = target.name.as_str();
        if let LeakDetection::Disabled { reason } = &target.sanitizers.leak_detection {
            warn!(stage = name, reason = %reason, "leak detection disabled for target");
        }

        let label = format!("{FUZZ_SUBPROJECT}/{name}");
        let started = Utc::now();

        let build = self.driver.build_command(target);
        let built = run_process(
            ProcessRequest {
                stage: &label,
                command: &build,
                cwd: &self.dir,
                limit: None,
                capture_stdout: false,
            },
            cancel,
        )
        .await?;
        match built {
            ProcessOutcome::Exited { exit, .. } if exit.success() => {}
            ProcessOutcome::Exited { exit, .. } => {
                warn!(stage = name, exit = %exit, "fuzz target failed to build");
                let result = StageResult::from_exit(FUZZ_SUBPROJECT, name, true, exit, started);
                return Ok(result.with_detail("build failed"));
            }
            ProcessOutcome::TimedOut => {
                return Ok(StageResult::timed_out(FUZZ_SUBPROJECT, name, true, started));
            }
        }

        let artifact_dir = self.driver.artifact_dir(name).map(|d| self.dir.join(d));
        let before = artifact_dir.as_deref().map(list_files).unwrap_or_default();

        let command = self.driver.run_command(target);
        let limit = target.hard_limit(self.settings.grace);
        let outcome = run_process(
            ProcessRequest {
                stage: &label,
                command: &command,
                cwd: &self.dir,
                limit: Some(limit),
                capture_stdout: false,
            },
            cancel,
        )
        .await?;

        let mut result = match outcome {
            ProcessOutcome::Exited { exit, .. } => {
                StageResult::from_exit(FUZZ_SUBPROJECT, name, true, exit, started)
            }
            ProcessOutcome::TimedOut => {
                let detail = format!(
                    "killed after {}s ({}s budget + {}s grace)",
                    limit.as_secs(),
                    target.budget.as_secs(),
                    self.settings.grace.as_secs()
                );
                StageResult::timed_out(FUZZ_SUBPROJECT, name, true, started)
                    .with_detail(detail)
            }
        };

        if let Some(dir) = artifact_dir {
            let reproducers: Vec<String> = list_files(&dir)
                .difference(&before)
                .map(|p| p.display().to_string())
                .collect();
            if !reproducers.is_empty() {
                let note = format!("reproducers: {}", reproducers.join(", "));
                result.detail = Some(match result.detail.take() {
                    Some(existing) => format!("{existing}; {note}"),
                    None => note,
                });
            }
        }

        Ok(result)
    }

    /// Discovers the targets and runs all of them.
    ///
    /// Provisioning problems and interrupts halt the campaign and are
    /// reported through [`CampaignReport::halted`].
    pub async fn run(&self, sink: &dyn EventSink, cancel: &CancellationToken) -> CampaignReport {
        let mut report = CampaignReport::default();

        let targets = match self.discover(cancel).await {
            Ok(targets) => targets,
            Err(err) => {
                warn!(error = %err, "fuzz target discovery failed");
                report.halted = Some(FinalStatus::from_error(&err));
                return report;
            }
        };
        report.targets = targets.iter().map(|t| t.name.clone()).collect();
        info!(count = targets.len(), targets = ?report.targets, "discovered fuzz targets");
        let discovered = json!({ "targets": report.targets });
        sink.emit("fuzz.discovered", Some(discovered)).await;

        for target in &targets {
            info!(
                subproject = FUZZ_SUBPROJECT,
                stage = %target.name,
                budget_secs = target.budget.as_secs(),
                workers = target.workers,
                "fuzz target started"
            );
            sink.emit(
                "fuzz.target.started",
                Some(json!({ "subproject": FUZZ_SUBPROJECT, "stage": target.name })),
            )
            .await;

            match self.run_one(target, cancel).await {
                Ok(result) => {
                    let exit_code = result.exit.and_then(|e| e.code);
                    if result.is_failure() {
                        warn!(
                            subproject = FUZZ_SUBPROJECT,
                            stage = %target.name,
                            exit_code = ?exit_code,
                            timed_out = result.timed_out,
                            "fuzz target failed"
                        );
                    } else {
                        info!(
                            subproject = FUZZ_SUBPROJECT,
                            stage = %target.name,
                            exit_code = ?exit_code,
                            "fuzz target completed"
                        );
                    }
                    sink.emit(
                        "fuzz.target.completed",
                        Some(json!({
                            "subproject": FUZZ_SUBPROJECT,
                            "stage": target.name,
                            "outcome": result.outcome.to_string(),
                            "timed_out": result.timed_out,
                        })),
                    )
                    .await;
                    report.results.push(result);
                }
                Err(err) => {
                    report.halted = Some(FinalStatus::from_error(&err));
                    break;
                }
            }
        }

        report
    }
}

fn list_files(dir: &Path) -> BTreeSet<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
        .unwrap_or_default()
}
