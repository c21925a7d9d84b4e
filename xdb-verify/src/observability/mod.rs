//! Logging setup and the end-of-run summary.
//!
//! All orchestrator output goes to stderr through `tracing`; tool output is
//! inherited untouched. Stage markers carry `subproject`, `stage`, and
//! `exit_code` fields, and every line of a run sits under a span carrying
//! its `run_id`.

mod logging;
mod report;

pub use logging::{init_tracing, LogFormat, LoggingConfig};
pub use report::log_report;
