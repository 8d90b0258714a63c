//! Configuration loading and typed config structures.
//!
//! Configuration is YAML (typically `phasekit.yaml`). Every field has a
//! default, so an empty document is a valid configuration. Command-line
//! style arguments (see [`crate::args`]) are applied on top of these
//! values when a test starts.

use std::path::Path;
use std::time::Duration;

use phasekit_types::Verbosity;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PhasekitConfig {
    /// Phase engine limits and tracing.
    #[serde(default)]
    pub phasing: PhasingConfig,

    /// Report server settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Objection settings.
    #[serde(default)]
    pub objection: ObjectionConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Default test selection.
    #[serde(default)]
    pub test: TestConfig,
}

impl PhasekitConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `PHASEKIT_TESTNAME` overrides `test.name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.test.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.test.apply_env_overrides();
        Ok(config)
    }
}

/// Phase engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PhasingConfig {
    /// Upper bound on `phase_ready_to_end` rounds before a phase is forced
    /// to end.
    #[serde(default = "default_max_ready_to_end_iterations")]
    pub max_ready_to_end_iterations: u32,

    /// How long each ready-to-end round waits for objections to drop.
    #[serde(default = "default_ready_to_end_wait_ms")]
    pub ready_to_end_wait_ms: u64,

    /// Task phase execution limit in milliseconds of simulation time
    /// (0 disables the guard).
    #[serde(default = "default_phase_timeout_ms")]
    pub phase_timeout_ms: u64,

    /// Report every phase state transition.
    #[serde(default)]
    pub trace: bool,
}

impl PhasingConfig {
    /// Ready-to-end wait as a [`Duration`].
    pub const fn ready_to_end_wait(&self) -> Duration {
        Duration::from_millis(self.ready_to_end_wait_ms)
    }

    /// Phase timeout as a [`Duration`]; `None` when disabled.
    pub const fn phase_timeout(&self) -> Option<Duration> {
        if self.phase_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.phase_timeout_ms))
        }
    }
}

impl Default for PhasingConfig {
    fn default() -> Self {
        Self {
            max_ready_to_end_iterations: default_max_ready_to_end_iterations(),
            ready_to_end_wait_ms: default_ready_to_end_wait_ms(),
            phase_timeout_ms: default_phase_timeout_ms(),
            trace: false,
        }
    }
}

/// Report server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReportConfig {
    /// Informational reports above this verbosity are dropped.
    #[serde(default)]
    pub verbosity: Verbosity,

    /// Errors after which the run aborts (0 = never).
    #[serde(default)]
    pub max_quit_count: u32,
}

/// Objection configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ObjectionConfig {
    /// Report every raise and drop.
    #[serde(default)]
    pub trace: bool,
}

/// Logging configuration for the runner binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG` is
    /// not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Default test selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TestConfig {
    /// Test to run when none is given on the command line.
    #[serde(default)]
    pub name: String,

    /// Command-line style arguments applied before the command line's own.
    #[serde(default)]
    pub args: Vec<String>,
}

impl TestConfig {
    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PHASEKIT_TESTNAME") {
            self.name = val;
        }
    }
}

const fn default_max_ready_to_end_iterations() -> u32 {
    20
}

const fn default_ready_to_end_wait_ms() -> u64 {
    1000
}

const fn default_phase_timeout_ms() -> u64 {
    9_200_000
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PhasekitConfig::default();
        assert_eq!(config.phasing.max_ready_to_end_iterations, 20);
        assert_eq!(config.phasing.phase_timeout(), Some(Duration::from_secs(9200)));
        assert_eq!(config.report.verbosity, Verbosity::Medium);
        assert_eq!(config.logging.level, "info");
        assert!(config.test.args.is_empty());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
phasing:
  max_ready_to_end_iterations: 5
  ready_to_end_wait_ms: 10
  phase_timeout_ms: 0
  trace: true
report:
  verbosity: high
  max_quit_count: 3
objection:
  trace: true
logging:
  level: debug
  json: true
test:
  name: smoke_test
  args:
    - +VERBOSITY=LOW
";
        let config = PhasekitConfig::parse(yaml).unwrap();
        assert_eq!(config.phasing.max_ready_to_end_iterations, 5);
        assert_eq!(config.phasing.ready_to_end_wait(), Duration::from_millis(10));
        assert_eq!(config.phasing.phase_timeout(), None);
        assert!(config.phasing.trace);
        assert_eq!(config.report.verbosity, Verbosity::High);
        assert_eq!(config.report.max_quit_count, 3);
        assert!(config.objection.trace);
        assert!(config.logging.json);
        assert_eq!(config.test.args, vec!["+VERBOSITY=LOW".to_owned()]);
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = PhasekitConfig::parse("{}").unwrap();
        assert_eq!(config.phasing, PhasingConfig::default());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = PhasekitConfig::parse("phasing: [1, 2");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
