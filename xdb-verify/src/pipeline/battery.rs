//! The xdb verification battery.

use super::{PipelineSpec, SubProject};
use crate::config::VerifyConfig;
use crate::core::StageKind;
use crate::errors::PipelineValidationError;
use crate::isolation::IsolationPolicy;
use crate::stages::{CommandSpec, Stage};

/// Reason the model-testing stage does not gate the pipeline by default.
pub const MODEL_TESTS_TOLERATED: &str = "shuttle model tests are not stable enough yet";

/// Builds the xdb pipeline: the main crate, the model-testing crate, and
/// the integration test crate, in that order.
///
/// The main crate's tests run one case per process because its platform
/// shims keep process-wide state.
///
/// # Errors
///
/// Returns an error if the resulting pipeline does not validate.
pub fn xdb_pipeline(config: &VerifyConfig) -> Result<PipelineSpec, PipelineValidationError> {
    let nightly = format!("+{}", config.nightly_toolchain);

    let xdb = SubProject::new("xdb", ".")
        .stage(Stage::new(
            "clippy",
            StageKind::Lint,
            CommandSpec::cargo(["clippy", "--workspace", "--all-targets"]),
        ))
        .stage(Stage::new(
            "fmt",
            StageKind::Format,
            CommandSpec::cargo(["fmt", "--all", "--", "--check"]),
        ))
        .stage(
            Stage::new(
                "test",
                StageKind::Test,
                CommandSpec::cargo(["test", "--workspace"]),
            )
            .with_isolation(IsolationPolicy::PerTestProcess),
        )
        .stage(
            Stage::new(
                "miri",
                StageKind::ModelCheck,
                CommandSpec::cargo([nightly.as_str(), "miri", "test", "-p", "xdb"])
                    .env("MIRIFLAGS", config.miri.env_value()),
            )
            .with_isolation(IsolationPolicy::PerTestProcess),
        );

    let shuttle_test = Stage::new(
        "test",
        StageKind::Test,
        CommandSpec::cargo(["test", "--release"]),
    );
    let shuttle_test = if config.model_tests.promoted {
        shuttle_test
    } else {
        shuttle_test.tolerated(MODEL_TESTS_TOLERATED)
    };
    let shuttle = SubProject::new("xdb-shuttle", "xdb-shuttle").stage(shuttle_test);

    let tests = SubProject::new("xdb-tests", "xdb-tests")
        .stage(Stage::new(
            "clippy",
            StageKind::Lint,
            CommandSpec::cargo(["clippy", "--all-targets"]),
        ))
        .stage(Stage::new(
            "predictable",
            StageKind::Test,
            CommandSpec::cargo(["run", "--release", "--", "single-threaded-predictable"]),
        ));

    let pipeline = PipelineSpec::new("xdb")?
        .subproject(xdb)
        .subproject(shuttle)
        .subproject(tests);
    pipeline.validate()?;
    Ok(pipeline)
}
