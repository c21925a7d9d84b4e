//! Logging a finished run.

use crate::pipeline::{FinalStatus, PipelineReport};
use tracing::{error, info, warn};

/// Writes the per-stage summary and the final status line.
///
/// The final line is logged at the level matching its severity so that it
/// stands out from tool output in a CI log.
pub fn log_report(report: &PipelineReport) {
    let lines = report.summary_lines();
    let Some((last, per_stage)) = lines.split_last() else {
        return;
    };

    for line in per_stage {
        info!("{line}");
    }

    match &report.status {
        FinalStatus::Passed => info!(exit_code = report.exit_code(), "{last}"),
        FinalStatus::Interrupted { .. } => warn!(exit_code = report.exit_code(), "{last}"),
        _ => error!(exit_code = report.exit_code(), "{last}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExitInfo;
    use crate::stages::StageResult;
    use chrono::Utc;

    fn report(status: FinalStatus) -> PipelineReport {
        PipelineReport::new(
            "run-1",
            vec![
                StageResult::from_exit("xdb", "clippy", true, ExitInfo::code(0), Utc::now()),
                StageResult::from_exit("xdb-shuttle", "test", false, ExitInfo::code(1), Utc::now()),
            ],
            status,
        )
    }

    #[test]
    fn test_log_report_handles_every_status() {
        log_report(&report(FinalStatus::Passed));
        log_report(&report(FinalStatus::Interrupted {
            stage: "xdb/miri".into(),
            reason: "received SIGINT".into(),
        }));
        log_report(&report(FinalStatus::ProvisioningFailure {
            message: "missing tools: cargo-fuzz".into(),
        }));
    }

    #[test]
    fn test_empty_report_still_has_a_final_line() {
        let empty = PipelineReport::new("run-2", Vec::new(), FinalStatus::Passed);
        assert_eq!(empty.summary_lines().len(), 1);
        log_report(&empty);
    }
}
