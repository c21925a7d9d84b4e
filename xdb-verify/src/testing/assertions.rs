//! Assertions over pipeline reports.

use crate::pipeline::{FinalStatus, PipelineReport};

use super::ScriptedExecutor;

/// Asserts that the run passed.
pub fn assert_passed(report: &PipelineReport) {
    assert!(
        report.status.is_passed(),
        "Expected a passing run, got: {}",
        report.status
    );
}

/// Asserts the final status.
pub fn assert_status(report: &PipelineReport, expected: &FinalStatus) {
    assert_eq!(
        &report.status, expected,
        "Expected status {expected}, got {}",
        report.status
    );
}

/// Asserts the `subproject/stage` labels of the recorded results.
pub fn assert_result_labels(report: &PipelineReport, expected: &[&str]) {
    let labels: Vec<String> = report.results.iter().map(|r| r.label()).collect();
    assert_eq!(labels, expected, "Unexpected stage results");
}

/// Asserts the exact order in which stages were executed.
pub fn assert_invocation_order(executor: &ScriptedExecutor, expected: &[&str]) {
    assert_eq!(executor.labels(), expected, "Unexpected execution order");
}
