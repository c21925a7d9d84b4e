//! Test doubles for driving the pipeline without real tools.
//!
//! This module provides:
//! - A scripted [`StageExecutor`](crate::stages::StageExecutor) that records
//!   every invocation
//! - Assertions over pipeline reports
//! - Small stage and workspace fixtures

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_invocation_order, assert_passed, assert_result_labels, assert_status};
pub use fixtures::{noop_stage, workspace_with};
pub use mocks::{Invocation, Scripted, ScriptedExecutor};
