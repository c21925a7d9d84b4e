//! # xdb-verify
//!
//! Ordered verification pipeline for the xdb storage engine.
//!
//! A run drives the toolchain through every gate the code must pass:
//!
//! - **Static checks**: lints and formatting per sub-project
//! - **Tests**: with one process per test case where tests share
//!   process-wide state
//! - **Model checking**: the test suite under an undefined-behaviour
//!   interpreter, and schedule-exploration model tests
//! - **Fuzzing**: every target the fuzzing toolchain reports, each for a
//!   fixed time budget
//!
//! Stages run strictly in order. The first failing required stage stops the
//! run; tolerated stages log their failure and the run continues. A tool
//! that cannot be launched is a provisioning failure, never a test verdict.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xdb_verify::prelude::*;
//!
//! let config = VerifyConfig::load(None)?.apply_env()?;
//! let orchestrator = Orchestrator::from_config(&config, Arc::new(NoOpEventSink))?;
//! orchestrator.preflight().await?;
//!
//! let report = orchestrator.run(&CancellationToken::new()).await;
//! std::process::exit(report.exit_code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod fuzz;
pub mod isolation;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod toolchain;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{cancel_on_shutdown_signal, CancellationToken};
    pub use crate::config::VerifyConfig;
    pub use crate::core::{ExitInfo, StageKind, StageOutcome};
    pub use crate::errors::{PipelineValidationError, VerifyError};
    pub use crate::events::{EventSink, NoOpEventSink};
    pub use crate::fuzz::{CampaignSettings, CargoFuzz, FuzzCampaign, FuzzDriver, FuzzTarget};
    pub use crate::isolation::IsolationPolicy;
    pub use crate::observability::{init_tracing, log_report, LogFormat, LoggingConfig};
    pub use crate::pipeline::{
        xdb_pipeline, FinalStatus, FuzzPlan, Orchestrator, PipelineReport, PipelineSpec,
        Sequencer, SubProject,
    };
    pub use crate::stages::{
        CommandSpec, ProcessRunner, Requirement, Stage, StageExecutor, StageResult,
    };
}
