//! Error types for the runner binary.

/// Top-level error for the runner.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: phasekit_core::config::ConfigError,
    },

    /// The run could not be started.
    #[error("run error: {source}")]
    Run {
        /// The underlying run error.
        #[from]
        source: phasekit_core::RunError,
    },

    /// Logging could not be initialized.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
