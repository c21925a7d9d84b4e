//! Stage kind, outcome, and exit status types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of verification a stage performs.
///
/// Kinds carry an ordering rank: within a sub-project, a stage may never be
/// declared after a stage of a higher rank. Lint and format checks are
/// unordered relative to each other but precede builds and tests, which in
/// turn precede the model checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Static analysis (clippy).
    Lint,
    /// Style check in check-only mode (rustfmt).
    Format,
    /// Compile or run a driver binary.
    Build,
    /// Test runner.
    Test,
    /// Instrumented undefined-behaviour checker (miri).
    ModelCheck,
}

impl Default for StageKind {
    fn default() -> Self {
        Self::Test
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lint => write!(f, "lint"),
            Self::Format => write!(f, "format"),
            Self::Build => write!(f, "build"),
            Self::Test => write!(f, "test"),
            Self::ModelCheck => write!(f, "model_check"),
        }
    }
}

impl StageKind {
    /// Ordering rank used by pipeline validation.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Lint | Self::Format => 0,
            Self::Build | Self::Test => 1,
            Self::ModelCheck => 2,
        }
    }
}

/// The classified outcome of a completed stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The tool exited with status zero.
    Success,
    /// The tool reported a defect, or was killed.
    Failure,
    /// The stage was deliberately not run.
    Skipped {
        /// Why the stage was skipped. Always present so the exception stays
        /// auditable.
        reason: String,
    },
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
        }
    }
}

impl StageOutcome {
    /// Creates a skipped outcome.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Returns true if the outcome indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the outcome indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }

    /// Returns true if the stage was skipped.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Exit status captured from a finished tool process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one.
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// An exit with the given code.
    #[must_use]
    pub const fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Returns true for a zero exit code.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

impl From<std::process::ExitStatus> for ExitInfo {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "killed by signal {signal}"),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}
