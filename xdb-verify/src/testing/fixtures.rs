//! Stage and workspace fixtures.

use std::path::Path;

use crate::core::StageKind;
use crate::stages::{CommandSpec, Stage};

/// A stage whose command does nothing.
#[must_use]
pub fn noop_stage(name: &str, kind: StageKind) -> Stage {
    Stage::new(name, kind, CommandSpec::new("true"))
}

/// Creates a sub-project directory for each name under `base`.
///
/// # Errors
///
/// Returns any error from creating the directories.
pub fn workspace_with(base: &Path, subprojects: &[&str]) -> std::io::Result<()> {
    for name in subprojects {
        std::fs::create_dir_all(base.join(name))?;
    }
    Ok(())
}
