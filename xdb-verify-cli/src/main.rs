//! xdb-verify - run the xdb verification pipeline.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use xdb_verify::cancellation::{cancel_on_shutdown_signal, CancellationToken};
use xdb_verify::config::VerifyConfig;
use xdb_verify::errors::VerifyError;
use xdb_verify::events::NoOpEventSink;
use xdb_verify::observability::{init_tracing, log_report, LogFormat, LoggingConfig};
use xdb_verify::pipeline::{FinalStatus, Orchestrator};

/// Lint, test, model-check and fuzz the xdb workspace, in order.
///
/// Exit status: 0 passed, 1 defect or fuzz failure, 2 broken toolchain or
/// environment, 130 interrupted.
#[derive(Debug, Parser)]
#[command(name = "xdb-verify")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, env = "XDB_VERIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Workspace root
    #[arg(long)]
    root: Option<PathBuf>,

    /// Fuzzing time per target, in seconds
    #[arg(long)]
    fuzz_seconds: Option<u64>,

    /// Skip the fuzz campaign
    #[arg(long)]
    skip_fuzz: bool,

    /// Make a model-test failure fail the run
    #[arg(long)]
    promote_model_tests: bool,

    /// Do not check for tools on PATH before running
    #[arg(long)]
    no_preflight: bool,

    /// Print the plan and exit
    #[arg(long)]
    dry_run: bool,

    /// Log format: pretty, compact or json
    #[arg(long, default_value = "compact")]
    log_format: LogFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json_summary: bool,
}

impl Cli {
    /// Applies command-line overrides, the highest-precedence source.
    fn apply(&self, mut config: VerifyConfig) -> VerifyConfig {
        if let Some(root) = &self.root {
            config.root.clone_from(root);
        }
        if let Some(seconds) = self.fuzz_seconds {
            config.fuzz.budget_secs = seconds;
        }
        if self.skip_fuzz {
            config.fuzz.enabled = false;
        }
        if self.promote_model_tests {
            config.model_tests.promoted = true;
        }
        if self.no_preflight {
            config.preflight = false;
        }
        config
    }

    fn load_config(&self) -> Result<VerifyConfig, VerifyError> {
        let config = VerifyConfig::load(self.config.as_deref())?.apply_env()?;
        Ok(self.apply(config))
    }
}

fn fail(err: &VerifyError) -> i32 {
    let status = FinalStatus::from_error(err);
    error!(exit_code = status.exit_code(), "verification {status}");
    status.exit_code()
}

async fn run(cli: Cli) -> Result<i32> {
    let logging = LoggingConfig {
        format: cli.log_format,
        ..LoggingConfig::default()
    }
    .with_verbosity(cli.verbose);
    init_tracing(&logging).context("failed to initialize logging")?;

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(err) => return Ok(fail(&err)),
    };
    let orchestrator = match Orchestrator::from_config(&config, Arc::new(NoOpEventSink)) {
        Ok(orchestrator) => orchestrator,
        Err(err) => return Ok(fail(&err)),
    };

    if cli.dry_run {
        for line in orchestrator.plan_lines() {
            println!("{line}");
        }
        return Ok(0);
    }

    if config.preflight {
        if let Err(err) = orchestrator.preflight().await {
            return Ok(fail(&err));
        }
    }

    let cancel = CancellationToken::new();
    let signals = cancel_on_shutdown_signal(cancel.clone());
    let report = orchestrator.run(&cancel).await;
    signals.abort();

    log_report(&report);
    if cli.json_summary {
        let json = serde_json::to_string_pretty(&report)
            .context("failed to serialize report")?;
        println!("{json}");
    }
    Ok(report.exit_code())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("xdb-verify: {err:#}");
            2
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_arguments_keeps_config() {
        let cli = Cli::try_parse_from(["xdb-verify"]).unwrap();
        assert_eq!(cli.apply(VerifyConfig::default()), VerifyConfig::default());
        assert_eq!(cli.log_format, LogFormat::Compact);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "xdb-verify",
            "--root",
            "/src/xdb",
            "--fuzz-seconds",
            "5",
            "--skip-fuzz",
            "--promote-model-tests",
            "--no-preflight",
            "--log-format",
            "json",
            "-vv",
        ])
        .unwrap();

        let config = cli.apply(VerifyConfig::default());
        assert_eq!(config.root, PathBuf::from("/src/xdb"));
        assert_eq!(config.fuzz.budget_secs, 5);
        assert!(!config.fuzz.enabled);
        assert!(config.model_tests.promoted);
        assert!(!config.preflight);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_bad_log_format_rejected() {
        let parsed = Cli::try_parse_from(["xdb-verify", "--log-format", "xml"]);
        assert!(parsed.is_err());
    }
}
