//! One full verification run: the stage sequence, then the fuzz campaign.

use super::{xdb_pipeline, FinalStatus, PipelineReport, PipelineSpec, Sequencer, WorkingDirScope};
use crate::cancellation::CancellationToken;
use crate::config::VerifyConfig;
use crate::errors::VerifyError;
use crate::events::EventSink;
use crate::fuzz::{CargoFuzz, FuzzCampaign, FuzzDriver, FUZZ_SUBPROJECT};
use crate::isolation::IsolationPolicy;
use crate::stages::{CommandSpec, ProcessRunner, Requirement, StageExecutor, StageResult};
use crate::toolchain;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Whether the fuzz campaign runs after the stage sequence.
#[derive(Debug)]
pub enum FuzzPlan {
    /// Run the campaign.
    Run(FuzzCampaign),
    /// Record the campaign as skipped.
    Disabled {
        /// Why it is skipped.
        reason: String,
    },
}

/// Runs a pipeline and, if every required stage passed, the fuzz campaign.
#[derive(Debug)]
pub struct Orchestrator {
    root: PathBuf,
    pipeline: PipelineSpec,
    sequencer: Sequencer,
    sink: Arc<dyn EventSink>,
    fuzz: FuzzPlan,
    fuzz_list: Option<CommandSpec>,
}

impl Orchestrator {
    /// Creates an orchestrator with no fuzz campaign.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        pipeline: PipelineSpec,
        executor: Arc<dyn StageExecutor>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            root: root.into(),
            pipeline,
            sequencer: Sequencer::new(executor, Arc::clone(&sink)),
            sink,
            fuzz: FuzzPlan::Disabled {
                reason: "no fuzz campaign configured".to_string(),
            },
            fuzz_list: None,
        }
    }

    /// Sets the fuzz plan.
    #[must_use]
    pub fn with_fuzz(mut self, fuzz: FuzzPlan) -> Self {
        self.fuzz = fuzz;
        self
    }

    /// Builds the xdb battery with real processes and `cargo fuzz`.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace root cannot be resolved or the
    /// battery does not validate.
    pub fn from_config(
        config: &VerifyConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, VerifyError> {
        let root = config
            .root
            .canonicalize()
            .map_err(|source| VerifyError::WorkingDirectory {
                path: config.root.clone(),
                source,
            })?;
        let pipeline = xdb_pipeline(config)?;

        let mut orchestrator = Self::new(&root, pipeline, Arc::new(ProcessRunner::new()), sink);
        if config.fuzz.enabled {
            let driver = CargoFuzz::new(&config.nightly_toolchain, &config.fuzz.dir);
            orchestrator.fuzz_list = Some(driver.list_command());
            orchestrator.fuzz = FuzzPlan::Run(FuzzCampaign::new(
                Arc::new(driver),
                &root,
                config.fuzz.campaign_settings(),
            ));
        } else {
            orchestrator.fuzz = FuzzPlan::Disabled {
                reason: "fuzz campaign disabled by configuration".to_string(),
            };
        }
        Ok(orchestrator)
    }

    /// The workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The pipeline this orchestrator runs.
    #[must_use]
    pub fn pipeline(&self) -> &PipelineSpec {
        &self.pipeline
    }

    /// Checks that every needed tool is on `PATH` and that every cargo
    /// subcommand answers under the toolchain its stage selects.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::MissingTools`] listing every missing program
    /// or toolchain component.
    pub async fn preflight(&self) -> Result<(), VerifyError> {
        let label = format!("{FUZZ_SUBPROJECT}/list");
        let extra: Vec<(&str, &CommandSpec)> = self
            .fuzz_list
            .iter()
            .map(|command| (label.as_str(), command))
            .collect();
        toolchain::preflight(&self.pipeline, &extra, &self.root).await
    }

    /// Describes what a run would do, one line per step.
    #[must_use]
    pub fn plan_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .pipeline
            .iter_stages()
            .map(|(sp, stage)| {
                let mut line = format!(
                    "{}/{} [{}] in {}: {}",
                    sp.name,
                    stage.name,
                    stage.kind,
                    sp.root.join(&stage.working_dir).display(),
                    stage.command.display()
                );
                match &stage.requirement {
                    Requirement::Required => {}
                    Requirement::Tolerated { reason } => {
                        line.push_str(&format!(" (tolerated: {reason})"));
                    }
                    Requirement::Disabled { reason } => {
                        line.push_str(&format!(" (disabled: {reason})"));
                    }
                }
                if stage.isolation == IsolationPolicy::PerTestProcess {
                    line.push_str(" (one process per test)");
                }
                line
            })
            .collect();

        lines.push(match &self.fuzz {
            FuzzPlan::Run(campaign) => {
                let settings = campaign.settings();
                format!(
                    "{FUZZ_SUBPROJECT}: every discovered target for {}s with {} workers (killed after {}s)",
                    settings.budget.as_secs(),
                    settings.workers,
                    settings.hard_limit().as_secs()
                )
            }
            FuzzPlan::Disabled { reason } => format!("{FUZZ_SUBPROJECT}: skipped ({reason})"),
        });
        lines
    }

    /// Runs everything and returns the report.
    ///
    /// Every log line of the run carries a fresh `run_id`.
    pub async fn run(&self, cancel: &CancellationToken) -> PipelineReport {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("verify", run_id = %run_id, pipeline = %self.pipeline.name);

        async {
            info!(
                root = %self.root.display(),
                stages = self.pipeline.stage_count(),
                "verification started"
            );

            let mut report = self
                .sequencer
                .run(&self.pipeline, &self.root, &run_id, cancel)
                .await;
            if !report.status.is_passed() {
                return report;
            }

            match &self.fuzz {
                FuzzPlan::Disabled { reason } => {
                    warn!(reason = %reason, "fuzz campaign skipped");
                    let skipped = StageResult::skipped(FUZZ_SUBPROJECT, "campaign", false, reason);
                    report.results.push(skipped);
                    report
                }
                FuzzPlan::Run(campaign) => {
                    let scope = match WorkingDirScope::enter(&self.root).await {
                        Ok(scope) => scope,
                        Err(err) => {
                            report.status = FinalStatus::from_error(&err);
                            return report;
                        }
                    };
                    let campaign_report = campaign.run(self.sink.as_ref(), cancel).await;
                    drop(scope);
                    report.with_campaign(campaign_report)
                }
            }
        }
        .instrument(span)
        .await
    }
}
