//! Command-line runner for Phasekit testbenches.
//!
//! Loads configuration, initializes logging, registers the demonstration
//! bench with the factory and runs one test. Command-line arguments are
//! `+KEY=value` settings appended after the ones from the config file, so
//! `phasekit-runner +TESTNAME=long_test +PHASE_TRACE` selects the test and
//! traces every phase transition.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `$PHASEKIT_CONFIG` or `phasekit.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Create the root and register the bench
//! 4. Run the test and log the summary
//!
//! The process exits non-zero when the run aborted or reported errors.

mod bench;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::Context as _;
use phasekit_core::config::LoggingConfig;
use phasekit_core::{ArgsSource, PhasekitConfig, Root};
use phasekit_report::{ReportServer, TracingSink};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::RunnerError;

const DEFAULT_CONFIG: &str = "phasekit.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or the run cannot
/// start.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let config = load_config().context("loading configuration")?;
    init_logging(&config.logging)?;

    info!(
        test = config.test.name,
        max_ready_to_end_iterations = config.phasing.max_ready_to_end_iterations,
        phase_timeout_ms = config.phasing.phase_timeout_ms,
        "phasekit-runner starting"
    );

    let reporter = Rc::new(ReportServer::new(TracingSink));
    let root = Root::from_config(&config, reporter);
    root.set_config_source(
        ArgsSource::new(config.test.args.iter().cloned()).with_args(std::env::args().skip(1)),
    );
    let traffic = bench::register(&root);

    let summary = root
        .run_test(&config.test.name)
        .await
        .map_err(RunnerError::from)?;

    info!(
        test = summary.test_name,
        test_type = summary.test_type,
        state = ?summary.state,
        sim_time_ms = summary.sim_time_ms,
        sent = traffic.sent(),
        received = traffic.received(),
        "run complete"
    );
    match serde_json::to_string(&summary) {
        Ok(json) => info!(summary = %json, "run summary"),
        Err(e) => warn!(error = %e, "failed to serialize run summary"),
    }

    if summary.passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Load configuration from `$PHASEKIT_CONFIG`, falling back to
/// `phasekit.yaml` in the working directory and then to defaults.
fn load_config() -> Result<PhasekitConfig, RunnerError> {
    let path = std::env::var_os("PHASEKIT_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    if path.exists() {
        return Ok(PhasekitConfig::from_file(&path)?);
    }
    let mut config = PhasekitConfig::default();
    config.test.apply_env_overrides();
    Ok(config)
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig) -> Result<(), RunnerError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let result = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| RunnerError::Logging {
        message: e.to_string(),
    })
}
