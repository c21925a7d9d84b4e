//! Core domain model types for the verification pipeline.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage kind and outcome enums
//! - Captured exit status of a tool process

mod status;

pub use status::{ExitInfo, StageKind, StageOutcome};
