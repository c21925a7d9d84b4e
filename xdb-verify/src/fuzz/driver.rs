//! The fuzzing driver seam.

use super::FuzzTarget;
use crate::stages::CommandSpec;
use std::path::PathBuf;

/// A fuzzing toolchain queried through a stable list/run interface.
///
/// Target names are never hard-coded in the orchestrator; they come from
/// [`FuzzDriver::list_command`] on every campaign.
#[cfg_attr(test, mockall::automock)]
pub trait FuzzDriver: Send + Sync {
    /// Command printing one target name per line on stdout.
    fn list_command(&self) -> CommandSpec;

    /// Command compiling one target without running it.
    ///
    /// Runs untimed before [`FuzzDriver::run_command`], so the timed run
    /// starts fuzzing without a compile step.
    fn build_command(&self, target: &FuzzTarget) -> CommandSpec;

    /// Command fuzzing one target within its budget and worker count.
    fn run_command(&self, target: &FuzzTarget) -> CommandSpec;

    /// Directory where the driver leaves reproducers for `target`, relative
    /// to the campaign directory.
    fn artifact_dir(&self, target: &str) -> Option<PathBuf>;
}

/// `cargo fuzz` with libFuzzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CargoFuzz {
    toolchain: String,
    fuzz_dir: PathBuf,
}

impl CargoFuzz {
    /// Creates a driver for the fuzz crate at `fuzz_dir`.
    #[must_use]
    pub fn new(toolchain: impl Into<String>, fuzz_dir: impl Into<PathBuf>) -> Self {
        Self {
            toolchain: toolchain.into(),
            fuzz_dir: fuzz_dir.into(),
        }
    }

    fn base(&self, subcommand: &str) -> CommandSpec {
        CommandSpec::cargo([format!("+{}", self.toolchain), "fuzz".to_string()])
            .arg(subcommand)
            .arg("--fuzz-dir")
            .arg(self.fuzz_dir.to_string_lossy())
    }
}

impl FuzzDriver for CargoFuzz {
    fn list_command(&self) -> CommandSpec {
        self.base("list")
    }

    fn build_command(&self, target: &FuzzTarget) -> CommandSpec {
        self.base("build").arg(&target.name)
    }

    fn run_command(&self, target: &FuzzTarget) -> CommandSpec {
        self.base("run")
            .arg(&target.name)
            .arg("--")
            .arg(format!("-max_total_time={}", target.budget.as_secs().max(1)))
            .arg(format!("-fork={}", target.workers.max(1)))
            .args(target.sanitizers.libfuzzer_flags())
    }

    fn artifact_dir(&self, target: &str) -> Option<PathBuf> {
        Some(self.fuzz_dir.join("artifacts").join(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzz::CampaignSettings;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn test_list_command() {
        let driver = CargoFuzz::new("nightly", "fuzz");
        assert_eq!(
            driver.list_command().display(),
            "cargo +nightly fuzz list --fuzz-dir fuzz"
        );
    }

    #[test]
    fn test_build_command() {
        let driver = CargoFuzz::new("nightly", "fuzz");
        let target = CampaignSettings::default().target("tree_ops");

        assert_eq!(
            driver.build_command(&target).display(),
            "cargo +nightly fuzz build --fuzz-dir fuzz tree_ops"
        );
    }

    #[test]
    fn test_run_command_carries_budget_and_workers() {
        let driver = CargoFuzz::new("nightly", "fuzz");
        let settings = CampaignSettings {
            budget: Duration::from_secs(60),
            workers: 8,
            ..CampaignSettings::default()
        };

        assert_eq!(
            driver.run_command(&settings.target("tree_ops")).display(),
            "cargo +nightly fuzz run --fuzz-dir fuzz tree_ops -- -max_total_time=60 -fork=8"
        );
    }

    #[test]
    fn test_run_command_disables_leaks_only_when_overridden() {
        let driver = CargoFuzz::new("nightly", "fuzz");
        let mut settings = CampaignSettings {
            workers: 2,
            ..CampaignSettings::default()
        };
        settings.leak_detection_disabled.insert(
            "tree_ops_u64_threaded".into(),
            "std thread internals".into(),
        );

        let cmd = driver.run_command(&settings.target("tree_ops_u64_threaded"));
        assert_eq!(cmd.args.last().map(String::as_str), Some("-detect_leaks=0"));

        let cmd = driver.run_command(&settings.target("tree_ops"));
        assert!(!cmd.args.iter().any(|a| a == "-detect_leaks=0"));
    }

    #[test]
    fn test_artifact_dir() {
        let driver = CargoFuzz::new("nightly", "fuzz");
        assert_eq!(
            driver.artifact_dir("tree_ops"),
            Some(PathBuf::from("fuzz/artifacts/tree_ops"))
        );
    }
}
