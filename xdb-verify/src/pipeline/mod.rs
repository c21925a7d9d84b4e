//! Pipeline definition and execution.
//!
//! This module provides:
//! - Pipeline and sub-project specifications with ordering validation
//! - The xdb battery
//! - The strictly sequential stage runner and the full-run orchestrator
//! - The final status and summary of a run

mod battery;
mod orchestrator;
mod sequencer;
mod spec;
mod summary;
mod workdir;

pub use battery::{xdb_pipeline, MODEL_TESTS_TOLERATED};
pub use orchestrator::{FuzzPlan, Orchestrator};
pub use sequencer::Sequencer;
pub use spec::{PipelineSpec, SubProject};
pub use summary::{FinalStatus, PipelineReport};
pub use workdir::WorkingDirScope;
