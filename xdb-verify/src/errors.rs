//! Error types for the verification pipeline.
//!
//! Only orchestrator-side problems are errors. A tool that runs and reports
//! a defect produces a [`StageResult`](crate::stages::StageResult) with a
//! failure outcome instead.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// A tool binary could not be launched. The toolchain is broken, so no
    /// meaningful verification happened.
    #[error("Provisioning failure in stage '{stage}': cannot launch '{program}': {source}")]
    Provisioning {
        /// Stage that tried to launch the tool.
        stage: String,
        /// Program that could not be launched.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// Preflight found tools missing from `PATH`.
    #[error("Provisioning failure: missing tools: {}", format_missing(.0))]
    MissingTools(Vec<MissingTool>),

    /// A query command such as a target listing exited unsuccessfully.
    #[error("Provisioning failure: '{command}' failed with {status}")]
    ToolQuery {
        /// The command as displayed.
        command: String,
        /// How it ended.
        status: String,
    },

    /// The operator interrupted the run while a tool was executing.
    #[error("Interrupted during stage '{stage}': {reason}")]
    Interrupted {
        /// Stage that was running.
        stage: String,
        /// Cancellation reason.
        reason: String,
    },

    /// A working directory does not exist or cannot be entered.
    #[error("Working directory {} is unusable: {source}", path.display())]
    WorkingDirectory {
        /// The offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The pipeline definition is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Any other orchestrator I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VerifyError {
    /// Returns true if this error means the toolchain or environment is broken
    /// rather than the code under test.
    #[must_use]
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            Self::Provisioning { .. }
                | Self::MissingTools(_)
                | Self::ToolQuery { .. }
                | Self::WorkingDirectory { .. }
                | Self::Config(_)
                | Self::Validation(_)
        )
    }

    /// Returns true if this error came from an operator interrupt.
    #[must_use]
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

/// A tool that preflight could not find.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingTool {
    /// Program name as written in the stage command.
    pub program: String,
    /// Stages that need it, as `subproject/stage`.
    pub needed_by: Vec<String>,
}

fn format_missing(tools: &[MissingTool]) -> String {
    tools
        .iter()
        .map(|t| format!("{} (needed by {})", t.program, t.needed_by.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Cannot read config file {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for the schema.
    #[error("Cannot parse config file {}: {source}", path.display())]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// An environment override holds an unusable value.
    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// Offending value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_error_is_distinct_from_interrupt() {
        let err = VerifyError::Provisioning {
            stage: "miri".to_string(),
            program: "cargo".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };

        assert!(err.is_provisioning());
        assert!(!err.is_interrupt());
        assert!(err.to_string().contains("miri"));
        assert!(err.to_string().contains("cargo"));
    }

    #[test]
    fn test_interrupted_error() {
        let err = VerifyError::Interrupted {
            stage: "test".to_string(),
            reason: "SIGINT".to_string(),
        };

        assert!(err.is_interrupt());
        assert!(!err.is_provisioning());
    }

    #[test]
    fn test_missing_tools_message_lists_consumers() {
        let err = VerifyError::MissingTools(vec![MissingTool {
            program: "cargo-fuzz".to_string(),
            needed_by: vec!["fuzz/list".to_string()],
        }]);

        assert!(err.is_provisioning());
        assert!(err.to_string().contains("cargo-fuzz (needed by fuzz/list)"));
    }

    #[test]
    fn test_pipeline_validation_error_serializes_stages() {
        let err = PipelineValidationError::new("miri must run after clippy")
            .with_stages(vec!["miri".to_string(), "clippy".to_string()]);

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["message"], "miri must run after clippy");
        assert_eq!(json["stages"], serde_json::json!(["miri", "clippy"]));
    }
}
