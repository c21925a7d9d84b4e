//! Pipeline and sub-project specifications.

use crate::errors::PipelineValidationError;
use crate::stages::Stage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// A crate with its own build graph and its own ordered stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubProject {
    /// Sub-project name.
    pub name: String,
    /// Root directory relative to the workspace root.
    pub root: PathBuf,
    /// Stages in execution order.
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl SubProject {
    /// Creates an empty sub-project.
    #[must_use]
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validates the sub-project.
    ///
    /// # Errors
    ///
    /// Returns an error if the sub-project has no stages, repeats a stage
    /// name, or declares a stage after one it must precede.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Sub-project '{}' has no stages",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(PipelineValidationError::new(format!(
                    "Sub-project '{}' declares stage '{}' twice",
                    self.name, stage.name
                ))
                .with_stages(vec![stage.name.clone()]));
            }
        }

        for pair in self.stages.windows(2) {
            let (earlier, later) = (&pair[0], &pair[1]);
            if later.kind.rank() < earlier.kind.rank() {
                return Err(PipelineValidationError::new(format!(
                    "Sub-project '{}': {} stage '{}' must run before {} stage '{}'",
                    self.name, later.kind, later.name, earlier.kind, earlier.name
                ))
                .with_stages(vec![earlier.name.clone(), later.name.clone()]));
            }
        }

        Ok(())
    }
}

/// The ordered list of sub-projects to verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// The pipeline name.
    pub name: String,
    /// Sub-projects in execution order.
    #[serde(default)]
    pub subprojects: Vec<SubProject>,
}

impl PipelineSpec {
    /// Creates a new pipeline specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or whitespace-only.
    pub fn new(name: impl Into<String>) -> Result<Self, PipelineValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Pipeline name cannot be empty or whitespace-only",
            ));
        }

        Ok(Self {
            name,
            subprojects: Vec::new(),
        })
    }

    /// Appends a sub-project.
    #[must_use]
    pub fn subproject(mut self, subproject: SubProject) -> Self {
        self.subprojects.push(subproject);
        self
    }

    /// Total number of stages across all sub-projects.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.subprojects.iter().map(|s| s.stages.len()).sum()
    }

    /// Iterates over `(subproject, stage)` in execution order.
    pub fn iter_stages(&self) -> impl Iterator<Item = (&SubProject, &Stage)> {
        self.subprojects
            .iter()
            .flat_map(|sp| sp.stages.iter().map(move |stage| (sp, stage)))
    }

    /// Validates every sub-project.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.subprojects.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no sub-projects",
                self.name
            )));
        }

        let mut names = HashSet::new();
        for subproject in &self.subprojects {
            if !names.insert(subproject.name.as_str()) {
                return Err(PipelineValidationError::new(format!(
                    "Pipeline '{}' declares sub-project '{}' twice",
                    self.name, subproject.name
                )));
            }
            subproject.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageKind;
    use crate::stages::CommandSpec;

    fn stage(name: &str, kind: StageKind) -> Stage {
        Stage::new(name, kind, CommandSpec::new("true"))
    }

    #[test]
    fn test_pipeline_spec_empty_name() {
        assert!(PipelineSpec::new("").is_err());
        assert!(PipelineSpec::new("   ").is_err());
    }

    #[test]
    fn test_lint_and_format_are_unordered() {
        let a = SubProject::new("xdb", ".")
            .stage(stage("fmt", StageKind::Format))
            .stage(stage("clippy", StageKind::Lint))
            .stage(stage("miri", StageKind::ModelCheck));
        let b = SubProject::new("xdb", ".")
            .stage(stage("clippy", StageKind::Lint))
            .stage(stage("fmt", StageKind::Format))
            .stage(stage("miri", StageKind::ModelCheck));

        assert!(a.validate().is_ok());
        assert!(b.validate().is_ok());
    }

    #[test]
    fn test_model_check_before_lint_is_rejected() {
        let sp = SubProject::new("xdb", ".")
            .stage(stage("miri", StageKind::ModelCheck))
            .stage(stage("clippy", StageKind::Lint));

        let err = sp.validate().unwrap_err();
        assert_eq!(err.stages, vec!["miri".to_string(), "clippy".to_string()]);
    }

    #[test]
    fn test_duplicate_stage_is_rejected() {
        let sp = SubProject::new("xdb", ".")
            .stage(stage("test", StageKind::Test))
            .stage(stage("test", StageKind::Test));

        assert!(sp.validate().is_err());
    }

    #[test]
    fn test_empty_pipeline_and_subproject_rejected() {
        let pipeline = PipelineSpec::new("xdb").unwrap();
        assert!(pipeline.validate().is_err());

        let pipeline = pipeline.subproject(SubProject::new("xdb", "."));
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn test_iter_stages_preserves_order() {
        let three = stage("three", StageKind::Test);
        let pipeline = PipelineSpec::new("xdb")
            .unwrap()
            .subproject(
                SubProject::new("a", "a")
                    .stage(stage("one", StageKind::Lint))
                    .stage(stage("two", StageKind::Test)),
            )
            .subproject(SubProject::new("b", "b").stage(three));

        let order: Vec<_> = pipeline
            .iter_stages()
            .map(|(sp, st)| format!("{}/{}", sp.name, st.name))
            .collect();
        assert_eq!(order, vec!["a/one", "a/two", "b/three"]);
        assert_eq!(pipeline.stage_count(), 3);
    }
}
