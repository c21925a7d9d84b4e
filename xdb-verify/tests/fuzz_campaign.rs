//! Fuzz campaign discovery and hard time limits with real processes.

use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use xdb_verify::events::CollectingEventSink;
use xdb_verify::prelude::*;

/// A driver whose listing and per-target commands are shell snippets.
#[derive(Debug)]
struct ScriptDriver {
    listing: String,
    targets: BTreeMap<String, String>,
}

impl ScriptDriver {
    fn new(targets: &[(&str, &str)]) -> Self {
        let listing = targets
            .iter()
            .map(|(name, _)| format!("echo {name}"))
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            listing,
            targets: targets
                .iter()
                .map(|(name, script)| ((*name).to_string(), (*script).to_string()))
                .collect(),
        }
    }
}

impl FuzzDriver for ScriptDriver {
    fn list_command(&self) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", self.listing.as_str()])
    }

    fn build_command(&self, _target: &FuzzTarget) -> CommandSpec {
        CommandSpec::new("true")
    }

    fn run_command(&self, target: &FuzzTarget) -> CommandSpec {
        let script = self.targets.get(&target.name).cloned().unwrap_or_default();
        CommandSpec::new("sh").args(["-c".to_string(), script])
    }

    fn artifact_dir(&self, target: &str) -> Option<PathBuf> {
        Some(PathBuf::from("artifacts").join(target))
    }
}

fn settings(budget: Duration, grace: Duration) -> CampaignSettings {
    CampaignSettings {
        budget,
        grace,
        workers: 1,
        leak_detection_disabled: BTreeMap::new(),
    }
}

#[tokio::test]
async fn discovery_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let driver = ScriptDriver::new(&[("tree_ops", "true"), ("big_tree_deletes", "true")]);
    let campaign = FuzzCampaign::new(
        Arc::new(driver),
        dir.path(),
        settings(Duration::from_secs(1), Duration::from_secs(5)),
    );
    let cancel = CancellationToken::new();

    let first = campaign.discover(&cancel).await.unwrap();
    let second = campaign.discover(&cancel).await.unwrap();

    assert_eq!(first, second);
    let names: Vec<_> = first.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["tree_ops", "big_tree_deletes"]);
}

#[tokio::test]
async fn overrunning_target_is_killed_and_campaign_continues() {
    let dir = tempfile::tempdir().unwrap();
    let driver = ScriptDriver::new(&[
        ("hangs", "sleep 30"),
        (
            "crashes",
            "mkdir -p artifacts/crashes && touch artifacts/crashes/crash-1 && exit 1",
        ),
        ("passes", "exit 0"),
    ]);
    let campaign = FuzzCampaign::new(
        Arc::new(driver),
        dir.path(),
        settings(Duration::from_secs(1), Duration::ZERO),
    );
    let sink = CollectingEventSink::new();

    let started = Instant::now();
    let report = campaign.run(&sink, &CancellationToken::new()).await;
    let elapsed = started.elapsed();

    assert!(
        elapsed < Duration::from_secs(10),
        "campaign took {elapsed:?}"
    );
    assert!(report.halted.is_none());
    assert_eq!(report.targets, vec!["hangs", "crashes", "passes"]);
    assert_eq!(report.results.len(), 3);

    let hangs = &report.results[0];
    assert!(hangs.is_failure());
    assert!(hangs.timed_out);
    assert!(hangs.exit.is_none());

    let crashes = &report.results[1];
    assert!(crashes.is_failure());
    let detail = crashes.detail.as_deref().unwrap_or_default();
    assert!(detail.contains("crash-1"));

    assert!(report.results[2].is_success());
    assert_eq!(report.failed_targets(), vec!["hangs", "crashes"]);
    assert_eq!(sink.events_of_type("fuzz.target.started").len(), 3);
}

#[tokio::test]
async fn fuzz_failures_fail_an_otherwise_passing_run() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("xdb")).unwrap();
    let driver = ScriptDriver::new(&[("tree_ops", "exit 1"), ("tree_ops_u64", "exit 0")]);
    let campaign = FuzzCampaign::new(
        Arc::new(driver),
        dir.path(),
        settings(Duration::from_secs(5), Duration::from_secs(5)),
    );
    let pipeline = PipelineSpec::new("xdb").unwrap().subproject(
        SubProject::new("xdb", "xdb").stage(Stage::new(
            "ok",
            StageKind::Test,
            CommandSpec::new("true"),
        )),
    );
    let orchestrator = Orchestrator::new(
        dir.path(),
        pipeline,
        Arc::new(ProcessRunner::new()),
        Arc::new(NoOpEventSink),
    )
    .with_fuzz(FuzzPlan::Run(campaign));

    let report = orchestrator.run(&CancellationToken::new()).await;

    assert_eq!(
        report.status,
        FinalStatus::FuzzFailures {
            targets: vec!["tree_ops".into()]
        }
    );
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.fuzz_targets, vec!["tree_ops", "tree_ops_u64"]);
    let summary = report.summary_line();
    assert!(summary.ends_with("fuzz: 2 targets run, 1 failed"));
}

#[tokio::test]
async fn required_stage_failure_prevents_the_campaign() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("xdb")).unwrap();
    let listed = dir.path().join("listed");
    let driver = ScriptDriver {
        listing: format!("touch {} && echo tree_ops", listed.display()),
        targets: BTreeMap::new(),
    };
    let campaign = FuzzCampaign::new(
        Arc::new(driver),
        dir.path(),
        settings(Duration::from_secs(1), Duration::ZERO),
    );
    let pipeline = PipelineSpec::new("xdb").unwrap().subproject(
        SubProject::new("xdb", "xdb").stage(Stage::new(
            "miri",
            StageKind::ModelCheck,
            CommandSpec::new("false"),
        )),
    );
    let orchestrator = Orchestrator::new(
        dir.path(),
        pipeline,
        Arc::new(ProcessRunner::new()),
        Arc::new(NoOpEventSink),
    )
    .with_fuzz(FuzzPlan::Run(campaign));

    let report = orchestrator.run(&CancellationToken::new()).await;

    assert_eq!(
        report.status,
        FinalStatus::DefectFailure {
            stage: "xdb/miri".into()
        }
    );
    assert_eq!(report.exit_code(), 1);
    assert!(report.fuzz_targets.is_empty());
    assert!(report.fuzz_results.is_empty());
    assert!(!listed.exists());
}
