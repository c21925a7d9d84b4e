//! Orchestrator configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional JSON
//! file, `XDB_VERIFY_*` environment variables, then command-line flags
//! (applied by the binary).

use crate::errors::ConfigError;
use crate::fuzz::{available_workers, CampaignSettings, DEFAULT_GRACE_SECS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Workspace root override.
pub const ENV_ROOT: &str = "XDB_VERIFY_ROOT";
/// Nightly toolchain override.
pub const ENV_NIGHTLY: &str = "XDB_VERIFY_NIGHTLY";
/// Per-target fuzz budget in seconds.
pub const ENV_FUZZ_SECONDS: &str = "XDB_VERIFY_FUZZ_SECONDS";
/// Skips the fuzz campaign when true.
pub const ENV_SKIP_FUZZ: &str = "XDB_VERIFY_SKIP_FUZZ";
/// Makes the model-testing stage required when true.
pub const ENV_PROMOTE_MODEL_TESTS: &str = "XDB_VERIFY_PROMOTE_MODEL_TESTS";

/// Model-checker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiriConfig {
    /// Passed through `MIRIFLAGS`.
    pub flags: Vec<String>,
}

impl Default for MiriConfig {
    fn default() -> Self {
        Self {
            flags: vec![
                "-Zmiri-strict-provenance".to_string(),
                "-Zmiri-env-forward=RUST_BACKTRACE".to_string(),
            ],
        }
    }
}

impl MiriConfig {
    /// The `MIRIFLAGS` value.
    #[must_use]
    pub fn env_value(&self) -> String {
        self.flags.join(" ")
    }
}

/// Fuzz campaign settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzConfig {
    /// Whether the campaign runs at all.
    pub enabled: bool,
    /// Fuzz crate directory, relative to the workspace root.
    pub dir: PathBuf,
    /// Fuzzing time per target.
    pub budget_secs: u64,
    /// Hard-kill allowance on top of the budget. Targets are built before
    /// their timed run, so a few seconds suffice.
    pub grace_secs: u64,
    /// Workers per target; defaults to the available cores.
    pub workers: Option<usize>,
    /// Targets whose leak reports are suppressed, with the reason.
    pub leak_detection_disabled: BTreeMap<String, String>,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        let mut leak_detection_disabled = BTreeMap::new();
        leak_detection_disabled.insert(
            "tree_ops_u64_threaded".to_string(),
            "thread runtime allocations outside xdb's control are reported as leaks".to_string(),
        );

        Self {
            enabled: true,
            dir: PathBuf::from("fuzz"),
            budget_secs: 60,
            grace_secs: DEFAULT_GRACE_SECS,
            workers: None,
            leak_detection_disabled,
        }
    }
}

impl FuzzConfig {
    /// Settings applied to every discovered target.
    #[must_use]
    pub fn campaign_settings(&self) -> CampaignSettings {
        CampaignSettings {
            budget: Duration::from_secs(self.budget_secs),
            grace: Duration::from_secs(self.grace_secs),
            workers: self.workers.unwrap_or_else(available_workers).max(1),
            leak_detection_disabled: self.leak_detection_disabled.clone(),
        }
    }
}

/// Model-testing sub-project settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTestsConfig {
    /// When true, a model-test failure fails the pipeline.
    pub promoted: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Workspace root.
    pub root: PathBuf,
    /// Rustup channel for the model checker and the fuzzer.
    pub nightly_toolchain: String,
    /// Model checker.
    pub miri: MiriConfig,
    /// Fuzz campaign.
    pub fuzz: FuzzConfig,
    /// Model-testing sub-project.
    pub model_tests: ModelTestsConfig,
    /// Check every required program is on `PATH` before running anything.
    pub preflight: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            nightly_toolchain: "nightly".to_string(),
            miri: MiriConfig::default(),
            fuzz: FuzzConfig::default(),
            model_tests: ModelTestsConfig::default(),
            preflight: true,
        }
    }
}

impl VerifyConfig {
    /// Loads defaults, overlaid with the JSON file at `path` if given.
    ///
    /// Fields missing from the file keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies `XDB_VERIFY_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for unparseable values.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for unparseable values.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_ROOT) {
            self.root = PathBuf::from(root);
        }
        if let Some(nightly) = lookup(ENV_NIGHTLY) {
            self.nightly_toolchain = nightly;
        }
        if let Some(value) = lookup(ENV_FUZZ_SECONDS) {
            self.fuzz.budget_secs = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_FUZZ_SECONDS.to_string(),
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_SKIP_FUZZ) {
            self.fuzz.enabled = !parse_bool(ENV_SKIP_FUZZ, &value)?;
        }
        if let Some(value) = lookup(ENV_PROMOTE_MODEL_TESTS) {
            self.model_tests.promoted = parse_bool(ENV_PROMOTE_MODEL_TESTS, &value)?;
        }
        Ok(self)
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}
