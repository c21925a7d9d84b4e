//! Stage-boundary events.
//!
//! Event types emitted by the pipeline:
//! - `stage.started`, `stage.completed`, `stage.skipped`, `stage.tolerated`
//! - `pipeline.aborted`, `pipeline.completed`
//! - `fuzz.discovered`, `fuzz.target.started`, `fuzz.target.completed`

mod sink;

pub use sink::{CollectingEventSink, EventSink, NoOpEventSink};
