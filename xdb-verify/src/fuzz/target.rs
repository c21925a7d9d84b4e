//! Fuzz targets and their per-target sanitizer overrides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Whether the leak sanitizer runs for a target.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "leak_detection", rename_all = "snake_case")]
pub enum LeakDetection {
    /// Leaks are reported (the default).
    #[default]
    Enabled,
    /// Leak reports are suppressed. The reason is mandatory.
    Disabled {
        /// Why the reports are not actionable.
        reason: String,
    },
}

/// Sanitizer settings that differ from the fuzzer defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SanitizerOverrides {
    /// Leak detection setting.
    #[serde(flatten)]
    pub leak_detection: LeakDetection,
}

impl SanitizerOverrides {
    /// libFuzzer flags implementing these overrides.
    #[must_use]
    pub fn libfuzzer_flags(&self) -> Vec<String> {
        match self.leak_detection {
            LeakDetection::Enabled => Vec::new(),
            LeakDetection::Disabled { .. } => vec!["-detect_leaks=0".to_string()],
        }
    }
}

/// A fuzz target discovered from the toolchain, with its run settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzTarget {
    /// Target name as reported by the fuzzing driver.
    pub name: String,
    /// Fuzzing time per run.
    pub budget: Duration,
    /// Parallel workers within the run.
    pub workers: usize,
    /// Sanitizer overrides.
    #[serde(default)]
    pub sanitizers: SanitizerOverrides,
}

impl FuzzTarget {
    /// Wall-clock limit for this target's run: its own budget plus `grace`.
    #[must_use]
    pub fn hard_limit(&self, grace: Duration) -> Duration {
        self.budget + grace
    }
}

/// Default allowance on top of a target's budget before it is killed.
pub const DEFAULT_GRACE_SECS: u64 = 10;

/// Settings applied to every discovered target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignSettings {
    /// Fuzzing time per target.
    pub budget: Duration,
    /// Extra time before the orchestrator kills a target that overran its
    /// budget. Targets are built before their timed run, so this only covers
    /// fuzzer startup and shutdown.
    pub grace: Duration,
    /// Workers per target run.
    pub workers: usize,
    /// Targets whose leak reports are suppressed, with the reason.
    pub leak_detection_disabled: BTreeMap<String, String>,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(60),
            grace: Duration::from_secs(DEFAULT_GRACE_SECS),
            workers: available_workers(),
            leak_detection_disabled: BTreeMap::new(),
        }
    }
}

impl CampaignSettings {
    /// Builds the target for a discovered name.
    #[must_use]
    pub fn target(&self, name: &str) -> FuzzTarget {
        let leak_detection = self
            .leak_detection_disabled
            .get(name)
            .map_or(LeakDetection::Enabled, |reason| LeakDetection::Disabled {
                reason: reason.clone(),
            });

        FuzzTarget {
            name: name.to_string(),
            budget: self.budget,
            workers: self.workers,
            sanitizers: SanitizerOverrides { leak_detection },
        }
    }

    /// Hard wall-clock limit for a target run with the campaign budget.
    #[must_use]
    pub fn hard_limit(&self) -> Duration {
        self.budget + self.grace
    }
}

/// One worker per available core.
#[must_use]
pub fn available_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
