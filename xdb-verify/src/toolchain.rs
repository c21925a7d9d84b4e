//! Toolchain preflight.
//!
//! A missing tool is reported before anything runs, so a half-provisioned
//! machine fails fast with every gap listed instead of one per attempt.
//!
//! Two checks run in order. Every program must resolve on `PATH`. Then
//! every cargo subcommand is asked for its version under the `+toolchain`
//! its stage selects, because rustup installs `cargo-miri` and friends as
//! proxies that resolve even when the channel or component is absent.

use crate::cancellation::CancellationToken;
use crate::errors::{MissingTool, VerifyError};
use crate::pipeline::PipelineSpec;
use crate::stages::{run_process, CommandSpec, ProcessOutcome, ProcessRequest, Requirement};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Cargo subcommands shipped as separate `cargo-<name>` binaries.
const EXTERNAL_SUBCOMMANDS: &[&str] = &["clippy", "fmt", "miri", "fuzz"];

/// Longest a version query may take. Rustup may be syncing a channel.
const QUERY_LIMIT: Duration = Duration::from_secs(120);

/// Programs a command needs on `PATH`.
///
/// For cargo commands this includes the external subcommand binary, found
/// after any `+toolchain` argument.
#[must_use]
pub fn programs_for(command: &CommandSpec) -> Vec<String> {
    let mut programs = vec![command.program.clone()];
    if command.program == "cargo" {
        let subcommand = command.args.iter().find(|a| !a.starts_with('+'));
        if let Some(sub) = subcommand.filter(|s| EXTERNAL_SUBCOMMANDS.contains(&s.as_str())) {
            programs.push(format!("cargo-{sub}"));
        }
    }
    programs
}

/// The `cargo [+toolchain] <subcommand>` prefix of a command that uses an
/// external cargo subcommand.
#[must_use]
pub fn subcommand_prefix(command: &CommandSpec) -> Option<CommandSpec> {
    let is_cargo = Path::new(&command.program)
        .file_name()
        .is_some_and(|name| name == "cargo");
    if !is_cargo {
        return None;
    }

    let position = command.args.iter().position(|a| !a.starts_with('+'))?;
    if !EXTERNAL_SUBCOMMANDS.contains(&command.args[position].as_str()) {
        return None;
    }
    let prefix = command.args[..=position].iter().cloned();
    Some(CommandSpec::new(&command.program).args(prefix))
}

/// Every enabled stage command and every `extra` command, with the label
/// of what needs it.
fn needed_commands<'a>(
    pipeline: &'a PipelineSpec,
    extra: &'a [(&str, &CommandSpec)],
) -> Vec<(String, &'a CommandSpec)> {
    let stages = pipeline
        .iter_stages()
        .filter(|(_, stage)| !matches!(stage.requirement, Requirement::Disabled { .. }))
        .map(|(subproject, stage)| {
            let label = format!("{}/{}", subproject.name, stage.name);
            (label, &stage.command)
        });
    let extra = extra
        .iter()
        .map(|(label, command)| ((*label).to_string(), *command));
    stages.chain(extra).collect()
}

/// Checks that every program the enabled stages and `extra` commands need
/// can be found, using `exists` to test each one.
///
/// # Errors
///
/// Returns [`VerifyError::MissingTools`] listing every missing program.
pub fn check_with<F>(
    pipeline: &PipelineSpec,
    extra: &[(&str, &CommandSpec)],
    exists: F,
) -> Result<(), VerifyError>
where
    F: Fn(&str) -> bool,
{
    let mut needed: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (label, command) in needed_commands(pipeline, extra) {
        for program in programs_for(command) {
            needed.entry(program).or_default().push(label.clone());
        }
    }

    let missing: Vec<MissingTool> = needed
        .into_iter()
        .filter(|(program, _)| {
            let found = exists(program);
            debug!(program = %program, found, "preflight");
            !found
        })
        .map(|(program, needed_by)| MissingTool {
            program,
            needed_by,
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(VerifyError::MissingTools(missing))
    }
}

/// Asks every cargo subcommand the pipeline uses for its version, from
/// `root`, under the toolchain its stage selects.
///
/// Tool stderr is inherited, so rustup's own explanation reaches the
/// operator.
///
/// # Errors
///
/// Returns [`VerifyError::MissingTools`] naming every query that failed,
/// and [`VerifyError::WorkingDirectory`] if `root` is unusable.
pub async fn query_toolchains(
    pipeline: &PipelineSpec,
    extra: &[(&str, &CommandSpec)],
    root: &Path,
) -> Result<(), VerifyError> {
    let mut queries: BTreeMap<String, (CommandSpec, Vec<String>)> = BTreeMap::new();
    for (label, command) in needed_commands(pipeline, extra) {
        if let Some(prefix) = subcommand_prefix(command) {
            queries
                .entry(prefix.display())
                .or_insert_with(|| (prefix.arg("--version"), Vec::new()))
                .1
                .push(label);
        }
    }

    let cancel = CancellationToken::new();
    let mut missing = Vec::new();
    for (tool, (query, needed_by)) in queries {
        let outcome = run_process(
            ProcessRequest {
                stage: "preflight",
                command: &query,
                cwd: root,
                limit: Some(QUERY_LIMIT),
                capture_stdout: true,
            },
            &cancel,
        )
        .await;
        let found = match outcome {
            Ok(ProcessOutcome::Exited { exit, .. }) => exit.success(),
            Ok(ProcessOutcome::TimedOut) | Err(VerifyError::Provisioning { .. }) => false,
            Err(err) => return Err(err),
        };
        debug!(tool = %tool, found, "preflight toolchain query");
        if !found {
            missing.push(MissingTool {
                program: tool,
                needed_by,
            });
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(VerifyError::MissingTools(missing))
    }
}

/// Checks the pipeline's programs against `PATH`, then queries its cargo
/// subcommands from `root`.
///
/// # Errors
///
/// Returns [`VerifyError::MissingTools`] listing every missing program or
/// toolchain component.
pub async fn preflight(
    pipeline: &PipelineSpec,
    extra: &[(&str, &CommandSpec)],
    root: &Path,
) -> Result<(), VerifyError> {
    check_with(pipeline, extra, |program| which::which(program).is_ok())?;
    query_toolchains(pipeline, extra, root).await?;
    info!("preflight passed, all tools found");
    Ok(())
}
