//! Stage definitions, results, and the runner that executes them.
//!
//! A stage is one external tool invocation with a pass/fail outcome. Stages
//! are plain data: what to run, where, whether a failure aborts the
//! pipeline, and how test cases must be isolated.

mod process;
mod result;
mod runner;

pub(crate) use process::{run_process, ProcessOutcome, ProcessRequest};
pub use result::StageResult;
pub use runner::{ProcessRunner, StageExecutor};

use crate::core::StageKind;
use crate::isolation::IsolationPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// How test-harness arguments reach the test binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarnessArgs {
    /// Appended after a `--` separator (cargo subcommands).
    #[default]
    AfterSeparator,
    /// Appended directly (a bare libtest binary).
    Direct,
}

/// An executable invocation with arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to launch, resolved through `PATH`.
    pub program: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables layered over the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// How harness arguments are passed.
    #[serde(default)]
    pub harness: HarnessArgs,
}

impl CommandSpec {
    /// Creates a command for a bare program.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            harness: HarnessArgs::Direct,
        }
    }

    /// Creates a `cargo` command with the given arguments.
    #[must_use]
    pub fn cargo<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: "cargo".to_string(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            harness: HarnessArgs::AfterSeparator,
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets how harness arguments are passed.
    #[must_use]
    pub fn with_harness(mut self, harness: HarnessArgs) -> Self {
        self.harness = harness;
        self
    }

    /// Returns a copy of this command with test-harness arguments added.
    #[must_use]
    pub fn with_harness_args(&self, extra: &[&str]) -> Self {
        let mut command = self.clone();
        if self.harness == HarnessArgs::AfterSeparator && !self.args.iter().any(|a| a == "--") {
            command.args.push("--".to_string());
        }
        command.args.extend(extra.iter().map(|s| (*s).to_string()));
        command
    }

    /// Renders the command line for logs.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Whether a failing stage aborts the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "requirement", rename_all = "snake_case")]
pub enum Requirement {
    /// Failure aborts the whole pipeline.
    #[default]
    Required,
    /// Known-unstable stage: failure is recorded and logged but tolerated.
    Tolerated {
        /// Why the failure is tolerated.
        reason: String,
    },
    /// Never invoked; always recorded as skipped.
    Disabled {
        /// Why the stage is disabled.
        reason: String,
    },
}

/// One verification stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Stage identifier, unique within its sub-project.
    pub name: String,
    /// What kind of check this is.
    #[serde(default)]
    pub kind: StageKind,
    /// Tool invocation.
    pub command: CommandSpec,
    /// Working directory relative to the sub-project root.
    #[serde(default)]
    pub working_dir: PathBuf,
    /// Failure handling.
    #[serde(default)]
    pub requirement: Requirement,
    /// Test case isolation.
    #[serde(default)]
    pub isolation: IsolationPolicy,
}

impl Stage {
    /// Creates a required, non-isolated stage.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StageKind, command: CommandSpec) -> Self {
        Self {
            name: name.into(),
            kind,
            command,
            working_dir: PathBuf::new(),
            requirement: Requirement::Required,
            isolation: IsolationPolicy::None,
        }
    }

    /// Sets the working directory relative to the sub-project root.
    #[must_use]
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Marks the stage as tolerated: failures are recorded but do not abort.
    #[must_use]
    pub fn tolerated(mut self, reason: impl Into<String>) -> Self {
        self.requirement = Requirement::Tolerated {
            reason: reason.into(),
        };
        self
    }

    /// Disables the stage; it is recorded as skipped without running.
    #[must_use]
    pub fn disabled(mut self, reason: impl Into<String>) -> Self {
        self.requirement = Requirement::Disabled {
            reason: reason.into(),
        };
        self
    }

    /// Sets the isolation policy.
    #[must_use]
    pub fn with_isolation(mut self, isolation: IsolationPolicy) -> Self {
        self.isolation = isolation;
        self
    }

    /// Returns true if a failure of this stage aborts the pipeline.
    #[must_use]
    pub fn is_required(&self) -> bool {
        matches!(self.requirement, Requirement::Required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cargo_harness_args_add_separator() {
        let cmd = CommandSpec::cargo(["test", "--workspace"]);
        let listed = cmd.with_harness_args(&["--list", "--format", "terse"]);

        assert_eq!(
            listed.args,
            vec!["test", "--workspace", "--", "--list", "--format", "terse"]
        );
    }

    #[test]
    fn test_cargo_harness_args_reuse_existing_separator() {
        let cmd = CommandSpec::cargo(["test", "--", "--test-threads=1"]);
        let exact = cmd.with_harness_args(&["--exact", "tree::insert"]);

        assert_eq!(
            exact.args,
            vec!["test", "--", "--test-threads=1", "--exact", "tree::insert"]
        );
    }

    #[test]
    fn test_direct_harness_args() {
        let cmd = CommandSpec::new("/tmp/test-bin").arg("hazard_");
        let listed = cmd.with_harness_args(&["--list"]);

        assert_eq!(listed.args, vec!["hazard_", "--list"]);
    }

    #[test]
    fn test_stage_requirement_builders() {
        let stage = Stage::new("test", StageKind::Test, CommandSpec::cargo(["test"]));
        assert!(stage.is_required());

        let tolerated = stage.clone().tolerated("flaky");
        assert!(!tolerated.is_required());

        let disabled = stage.disabled("broken upstream");
        assert_eq!(
            disabled.requirement,
            Requirement::Disabled {
                reason: "broken upstream".to_string()
            }
        );
    }

    #[test]
    fn test_command_display() {
        let cmd = CommandSpec::cargo(["fmt", "--all", "--", "--check"]);
        assert_eq!(cmd.display(), "cargo fmt --all -- --check");
    }
}
