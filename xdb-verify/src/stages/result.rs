//! Immutable record of a completed stage.

use crate::core::{ExitInfo, StageOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one completed stage or fuzz target run.
///
/// Created once the tool has finished and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// Sub-project the stage belongs to (`fuzz` for campaign targets).
    pub subproject: String,
    /// Stage name.
    pub name: String,
    /// Classified outcome.
    #[serde(flatten)]
    pub outcome: StageOutcome,
    /// Whether a failure of this stage aborts the pipeline.
    pub required: bool,
    /// Exit status of the tool, when one ran to completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<ExitInfo>,
    /// Set when the orchestrator killed the tool after its time budget.
    #[serde(default)]
    pub timed_out: bool,
    /// Extra detail such as failing test cases or reproducer paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a result classified from a tool's exit status.
    #[must_use]
    pub fn from_exit(
        subproject: impl Into<String>,
        name: impl Into<String>,
        required: bool,
        exit: ExitInfo,
        started_at: DateTime<Utc>,
    ) -> Self {
        let outcome = if exit.success() {
            StageOutcome::Success
        } else {
            StageOutcome::Failure
        };

        Self {
            subproject: subproject.into(),
            name: name.into(),
            outcome,
            required,
            exit: Some(exit),
            timed_out: false,
            detail: None,
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Creates a failure for a tool killed after its time budget.
    #[must_use]
    pub fn timed_out(
        subproject: impl Into<String>,
        name: impl Into<String>,
        required: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subproject: subproject.into(),
            name: name.into(),
            outcome: StageOutcome::Failure,
            required,
            exit: None,
            timed_out: true,
            detail: None,
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Creates a skipped result; the tool was never invoked.
    #[must_use]
    pub fn skipped(
        subproject: impl Into<String>,
        name: impl Into<String>,
        required: bool,
        reason: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            subproject: subproject.into(),
            name: name.into(),
            outcome: StageOutcome::skipped(reason),
            required,
            exit: None,
            timed_out: false,
            detail: None,
            started_at: now,
            ended_at: now,
        }
    }

    /// Attaches detail text.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Overrides the outcome. Used when several processes make up one stage.
    #[must_use]
    pub fn with_outcome(mut self, outcome: StageOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.outcome.is_failure()
    }

    /// Returns true if this failure must abort the pipeline.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.required && self.is_failure()
    }

    /// Qualified `subproject/stage` label.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.subproject, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_from_zero_exit() {
        let result = StageResult::from_exit("xdb", "clippy", true, ExitInfo::code(0), Utc::now());

        assert!(result.is_success());
        assert!(!result.is_blocking());
        assert_eq!(result.label(), "xdb/clippy");
    }

    #[test]
    fn test_result_from_nonzero_exit() {
        let result = StageResult::from_exit("xdb", "test", true, ExitInfo::code(101), Utc::now());

        assert!(result.is_failure());
        assert!(result.is_blocking());
        assert_eq!(result.exit, Some(ExitInfo::code(101)));
    }

    #[test]
    fn test_tolerated_failure_is_not_blocking() {
        let result =
            StageResult::from_exit("xdb-shuttle", "test", false, ExitInfo::code(1), Utc::now());

        assert!(result.is_failure());
        assert!(!result.is_blocking());
    }

    #[test]
    fn test_timed_out_result() {
        let result = StageResult::timed_out("fuzz", "tree_ops", false, Utc::now());

        assert!(result.is_failure());
        assert!(result.timed_out);
        assert!(result.exit.is_none());
    }

    #[test]
    fn test_result_duration() {
        let started = Utc::now();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let result = StageResult::from_exit("xdb", "fmt", true, ExitInfo::code(0), started);

        assert!(result.duration_ms() >= 10);
    }

    #[test]
    fn test_result_serialization() {
        let result = StageResult::skipped("xdb", "miri", true, "nightly unavailable");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "nightly unavailable");

        let back: StageResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
