//! Recovery configuration.
//!
//! Configuration can be loaded from:
//! 1. TOML file (`.scheduler-recovery.toml`)
//! 2. Environment variables (with `SCHEDULER_RECOVERY_` prefix)
//!
//! Environment variables override TOML configuration.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [recovery]
//! service_path = "/marathon/web"
//! operation_timeout_ms = 5000
//! max_in_flight_reads = 32
//! stale_pending = "retain"
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_MAX_IN_FLIGHT_READS, DEFAULT_OPERATION_TIMEOUT_MS,
    DEFAULT_SERVICE_PATH, ENV_PREFIX,
};

/// What happens to a pending entry whose name matches a persisted record
/// that was never dispatched.
///
/// The record's node is deleted either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePendingPolicy {
    /// Leave the pending entry for the next scheduling pass.
    #[default]
    Retain,
    /// Drop the pending entry together with the stale record.
    Remove,
}

impl fmt::Display for StalePendingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retain => f.write_str("retain"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

impl FromStr for StalePendingPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "remove" => Ok(Self::Remove),
            other => Err(ConfigError::Invalid(format!(
                "unknown stale pending policy '{other}' (expected 'retain' or 'remove')"
            ))),
        }
    }
}

/// Main recovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Service root in the coordination store. Tasks live under
    /// `{service_path}/tasks`.
    pub service_path: String,

    /// Bound on every individual store operation.
    pub operation_timeout_ms: u64,

    /// Maximum number of node reads kept in flight during `load_all`.
    pub max_in_flight_reads: usize,

    /// Handling of pending entries matched by undispatched records.
    pub stale_pending: StalePendingPolicy,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            service_path: DEFAULT_SERVICE_PATH.to_string(),
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            max_in_flight_reads: DEFAULT_MAX_IN_FLIGHT_READS,
            stale_pending: StalePendingPolicy::default(),
        }
    }
}

impl RecoveryConfig {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. `.scheduler-recovery.toml` in the working directory
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(contents) = std::fs::read_to_string(CONFIG_FILE_NAME) {
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply
    /// environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML content. A missing `[recovery]`
    /// table yields the defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            recovery: RecoveryConfig,
        }

        let full: FullConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(full.recovery)
    }

    /// Apply environment variable overrides.
    ///
    /// Unparseable numeric values are rejected rather than ignored so a
    /// typo cannot silently fall back to a default timeout.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(path) = env_var("SERVICE_PATH") {
            self.service_path = path;
        }
        if let Some(raw) = env_var("OPERATION_TIMEOUT_MS") {
            self.operation_timeout_ms = parse_env("OPERATION_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = env_var("MAX_IN_FLIGHT_READS") {
            self.max_in_flight_reads = parse_env("MAX_IN_FLIGHT_READS", &raw)?;
        }
        if let Some(raw) = env_var("STALE_PENDING") {
            self.stale_pending = raw.parse()?;
        }
        Ok(())
    }

    /// Checks that the configuration can drive a recovery load.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let trimmed = self.service_path.trim_end_matches('/');
        if !self.service_path.starts_with('/') || trimmed.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "service_path must be an absolute, non-root path (got '{}')",
                self.service_path
            )));
        }
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "operation_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_in_flight_reads == 0 {
            return Err(ConfigError::Invalid(
                "max_in_flight_reads must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the service root.
    pub fn with_service_path(mut self, path: impl Into<String>) -> Self {
        self.service_path = path.into();
        self
    }

    /// Sets the per-operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the read concurrency bound.
    pub fn with_max_in_flight_reads(mut self, max: usize) -> Self {
        self.max_in_flight_reads = max;
        self
    }

    /// Sets the stale pending policy.
    pub fn with_stale_pending(mut self, policy: StalePendingPolicy) -> Self {
        self.stale_pending = policy;
        self
    }

    /// The per-operation timeout as a [`Duration`].
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{suffix}")).ok()
}

fn parse_env<T: FromStr>(suffix: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| {
        ConfigError::Invalid(format!("{ENV_PREFIX}{suffix}: cannot parse '{raw}'"))
    })
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("Failed to read config file '{path}': {error}")]
    Io {
        /// Path to the config file.
        path: String,
        /// Error message.
        error: String,
    },

    /// TOML parse error.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range or unrecognised.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = RecoveryConfig::default();
        assert_eq!(config.service_path, "/scheduler");
        assert_eq!(config.operation_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_in_flight_reads, 64);
        assert_eq!(config.stale_pending, StalePendingPolicy::Retain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[recovery]
service_path = "/marathon/web"
operation_timeout_ms = 2500
max_in_flight_reads = 8
stale_pending = "remove"
"#;
        let config = RecoveryConfig::from_toml(toml).unwrap();
        assert_eq!(
            config,
            RecoveryConfig::default()
                .with_service_path("/marathon/web")
                .with_operation_timeout(Duration::from_millis(2500))
                .with_max_in_flight_reads(8)
                .with_stale_pending(StalePendingPolicy::Remove)
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = RecoveryConfig::from_toml("[recovery]\nservice_path = \"/x\"\n").unwrap();
        assert_eq!(config.service_path, "/x");
        assert_eq!(config.operation_timeout_ms, DEFAULT_OPERATION_TIMEOUT_MS);

        let config = RecoveryConfig::from_toml("").unwrap();
        assert_eq!(config, RecoveryConfig::default());
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = RecoveryConfig::from_toml("[recovery]\nmax_in_flight_reads = \"many\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = RecoveryConfig::from_toml("[recovery]\nstale_pending = \"keep\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[recovery]\nservice_path = \"/from/file\"").unwrap();
        let config = RecoveryConfig::from_file(file.path()).unwrap();
        assert_eq!(config.service_path, "/from/file");
    }

    #[test]
    fn from_missing_file_is_io_error() {
        let err = RecoveryConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn validate_rejects_bad_values() {
        for path in ["relative/path", "/", "//", ""] {
            let config = RecoveryConfig::default().with_service_path(path);
            assert!(config.validate().is_err(), "{path:?} should be rejected");
        }
        assert!(RecoveryConfig::default()
            .with_operation_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(RecoveryConfig::default()
            .with_max_in_flight_reads(0)
            .validate()
            .is_err());
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("Retain".parse::<StalePendingPolicy>().unwrap(), StalePendingPolicy::Retain);
        assert_eq!(" REMOVE ".parse::<StalePendingPolicy>().unwrap(), StalePendingPolicy::Remove);
        assert!("drop".parse::<StalePendingPolicy>().is_err());
        assert_eq!(StalePendingPolicy::Remove.to_string(), "remove");
    }

    #[test]
    fn parse_env_reports_variable_name() {
        let err = parse_env::<u64>("OPERATION_TIMEOUT_MS", "soon").unwrap_err();
        assert!(err.to_string().contains("SCHEDULER_RECOVERY_OPERATION_TIMEOUT_MS"));
        assert_eq!(parse_env::<usize>("MAX_IN_FLIGHT_READS", " 12 ").unwrap(), 12);
    }
}
