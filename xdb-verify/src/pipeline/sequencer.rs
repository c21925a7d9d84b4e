//! Strictly ordered execution of sub-projects and their stages.

use super::{FinalStatus, PipelineReport, PipelineSpec, WorkingDirScope};
use crate::cancellation::CancellationToken;
use crate::errors::VerifyError;
use crate::events::EventSink;
use crate::stages::{Requirement, StageExecutor, StageResult};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runs a [`PipelineSpec`] one stage at a time.
///
/// Nothing runs concurrently: each stage starts only after the previous one
/// has finished, and each sub-project's stages run with the process working
/// directory set to that sub-project's root.
#[derive(Debug, Clone)]
pub struct Sequencer {
    executor: Arc<dyn StageExecutor>,
    sink: Arc<dyn EventSink>,
}

impl Sequencer {
    /// Creates a sequencer.
    #[must_use]
    pub fn new(executor: Arc<dyn StageExecutor>, sink: Arc<dyn EventSink>) -> Self {
        Self { executor, sink }
    }

    /// Runs every stage of `pipeline` under `root`.
    ///
    /// Stops at the first required stage that fails, at the first
    /// provisioning error, or on cancellation. Stages after the stop point
    /// are not run and produce no result.
    pub async fn run(
        &self,
        pipeline: &PipelineSpec,
        root: &Path,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> PipelineReport {
        let mut results = Vec::with_capacity(pipeline.stage_count());

        if let Err(err) = pipeline.validate() {
            return self.halt(run_id, results, &VerifyError::from(err)).await;
        }

        for subproject in &pipeline.subprojects {
            let scope = match WorkingDirScope::enter(&root.join(&subproject.root)).await {
                Ok(scope) => scope,
                Err(err) => return self.halt(run_id, results, &err).await,
            };

            for stage in &subproject.stages {
                let label = format!("{}/{}", subproject.name, stage.name);
                let marker = json!({ "subproject": subproject.name, "stage": stage.name });

                if cancel.is_cancelled() {
                    let err = VerifyError::Interrupted {
                        stage: label,
                        reason: cancel.reason().unwrap_or_else(|| "cancelled".to_string()),
                    };
                    return self.halt(run_id, results, &err).await;
                }

                if let Requirement::Disabled { reason } = &stage.requirement {
                    warn!(
                        subproject = %subproject.name,
                        stage = %stage.name,
                        reason = %reason,
                        "stage disabled, skipping"
                    );
                    self.sink.emit("stage.skipped", Some(marker)).await;
                    let result = StageResult::skipped(&subproject.name, &stage.name, false, reason);
                    results.push(result);
                    continue;
                }

                info!(
                    subproject = %subproject.name,
                    stage = %stage.name,
                    command = %stage.command.display(),
                    "stage started"
                );
                self.sink.emit("stage.started", Some(marker.clone())).await;

                let cwd = scope.path().join(&stage.working_dir);
                let result = match self
                    .executor
                    .execute(&subproject.name, stage, &cwd, cancel)
                    .await
                {
                    Ok(result) => result,
                    Err(err) => return self.halt(run_id, results, &err).await,
                };

                let exit_code = result.exit.and_then(|e| e.code);
                info!(
                    subproject = %subproject.name,
                    stage = %stage.name,
                    exit_code = ?exit_code,
                    outcome = %result.outcome,
                    duration_ms = result.duration_ms(),
                    "stage completed"
                );
                self.sink
                    .emit(
                        "stage.completed",
                        Some(json!({
                            "subproject": subproject.name,
                            "stage": stage.name,
                            "outcome": result.outcome.to_string(),
                            "exit_code": exit_code,
                        })),
                    )
                    .await;

                if result.is_blocking() {
                    error!(
                        subproject = %subproject.name,
                        stage = %stage.name,
                        exit_code = ?exit_code,
                        "required stage failed, aborting pipeline"
                    );
                    self.sink.emit("pipeline.aborted", Some(marker)).await;
                    results.push(result);
                    return PipelineReport::new(
                        run_id,
                        results,
                        FinalStatus::DefectFailure { stage: label },
                    );
                }

                if result.is_failure() {
                    if let Requirement::Tolerated { reason } = &stage.requirement {
                        warn!(
                            subproject = %subproject.name,
                            stage = %stage.name,
                            exit_code = ?exit_code,
                            reason = %reason,
                            "tolerated stage failed, continuing"
                        );
                    }
                    self.sink.emit("stage.tolerated", Some(marker)).await;
                }

                results.push(result);
            }

            drop(scope);
        }

        self.sink.emit("pipeline.completed", None).await;
        PipelineReport::new(run_id, results, FinalStatus::Passed)
    }

    async fn halt(
        &self,
        run_id: &str,
        results: Vec<StageResult>,
        err: &VerifyError,
    ) -> PipelineReport {
        if err.is_interrupt() {
            warn!(error = %err, "pipeline interrupted");
        } else {
            error!(error = %err, "pipeline halted");
        }
        let aborted = json!({ "error": err.to_string() });
        self.sink.emit("pipeline.aborted", Some(aborted)).await;
        PipelineReport::new(run_id, results, FinalStatus::from_error(err))
    }
}
