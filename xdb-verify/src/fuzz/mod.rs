//! Time-boxed fuzzing of every target the fuzzing toolchain reports.

mod campaign;
mod driver;
mod target;

pub use campaign::{CampaignReport, FuzzCampaign};
#[cfg(test)]
pub(crate) use driver::MockFuzzDriver;
pub use driver::{CargoFuzz, FuzzDriver};
pub use target::{
    available_workers, CampaignSettings, FuzzTarget, LeakDetection, SanitizerOverrides,
    DEFAULT_GRACE_SECS,
};

/// Sub-project label used for fuzz target results.
pub const FUZZ_SUBPROJECT: &str = "fuzz";
