//! Orchestrator configuration.
//!
//! Loaded from a TOML file (`from_path`) or `CONCORD_*` environment
//! variables (`from_env`). Unset values take the defaults in
//! [`crate::constants`].

use crate::constants::{
    DEFAULT_LIST_CONCURRENCY, DEFAULT_OPERATION_BUDGET_MS, DEFAULT_VALIDATION_BUDGET_MS,
    ENV_LIST_CONCURRENCY, ENV_LOG_FORMAT, ENV_OPERATION_BUDGET_MS, ENV_RULES_PATH,
    ENV_TIMEOUT_MODE, ENV_VALIDATION_BUDGET_MS, MAX_LIST_CONCURRENCY,
};
use concord_core::{RuleError, RuleSet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// What happens when a phase exceeds its budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutMode {
    /// Record the overrun and carry on.
    #[default]
    Observe,
    /// Abort with a retryable timeout; writes already made are rolled back.
    Enforce,
}

impl FromStr for TimeoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "observe" => Ok(TimeoutMode::Observe),
            "enforce" => Ok(TimeoutMode::Enforce),
            other => Err(format!("unknown timeout mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("Failed to load compatibility rules: {0}")]
    Rules(#[from] RuleError),
    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("Failed to initialize tracing: {reason}")]
    Telemetry { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OrchestratorConfig {
    pub validation_budget_ms: u64,
    pub operation_budget_ms: u64,
    pub timeout_mode: TimeoutMode,
    pub list_concurrency: usize,
    /// Extra compatibility rules (JSON or YAML), appended to the standard set.
    pub rules_path: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            validation_budget_ms: DEFAULT_VALIDATION_BUDGET_MS,
            operation_budget_ms: DEFAULT_OPERATION_BUDGET_MS,
            timeout_mode: TimeoutMode::Observe,
            list_concurrency: DEFAULT_LIST_CONCURRENCY,
            rules_path: None,
            log_format: LogFormat::Json,
        }
    }
}

impl OrchestratorConfig {
    /// Create OrchestratorConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `CONCORD_VALIDATION_BUDGET_MS`: Validation phase budget (default: 300)
    /// - `CONCORD_OPERATION_BUDGET_MS`: Whole operation budget (default: 1000)
    /// - `CONCORD_TIMEOUT_MODE`: `observe` or `enforce` (default: observe)
    /// - `CONCORD_LIST_CONCURRENCY`: Agents assembled at once by list (default: 8)
    /// - `CONCORD_RULES_PATH`: Extra compatibility rule table
    /// - `CONCORD_LOG_FORMAT`: `json` or `pretty` (default: json)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    /// Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            validation_budget_ms: lookup(ENV_VALIDATION_BUDGET_MS)
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.validation_budget_ms),
            operation_budget_ms: lookup(ENV_OPERATION_BUDGET_MS)
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.operation_budget_ms),
            timeout_mode: lookup(ENV_TIMEOUT_MODE)
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_mode),
            list_concurrency: lookup(ENV_LIST_CONCURRENCY)
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.list_concurrency),
            rules_path: lookup(ENV_RULES_PATH)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            log_format: lookup(ENV_LOG_FORMAT)
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.log_format),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: OrchestratorConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validation_budget_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "validation_budget_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.operation_budget_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "operation_budget_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.operation_budget_ms < self.validation_budget_ms {
            return Err(ConfigError::InvalidValue {
                field: "operation_budget_ms",
                reason: "must be >= validation_budget_ms".to_string(),
            });
        }
        if self.list_concurrency == 0 || self.list_concurrency > MAX_LIST_CONCURRENCY {
            return Err(ConfigError::InvalidValue {
                field: "list_concurrency",
                reason: format!("must be between 1 and {}", MAX_LIST_CONCURRENCY),
            });
        }
        Ok(())
    }

    pub fn validation_budget(&self) -> Duration {
        Duration::from_millis(self.validation_budget_ms)
    }

    pub fn operation_budget(&self) -> Duration {
        Duration::from_millis(self.operation_budget_ms)
    }

    /// Standard rules plus the table at `rules_path`, if any.
    pub fn load_rules(&self) -> Result<RuleSet, ConfigError> {
        let mut rules = RuleSet::standard();
        if let Some(path) = &self.rules_path {
            rules.extend(RuleSet::from_path(path)?)?;
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.validation_budget(), Duration::from_millis(300));
        assert_eq!(config.operation_budget(), Duration::from_millis(1000));
        assert_eq!(config.timeout_mode, TimeoutMode::Observe);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_VALIDATION_BUDGET_MS, "150"),
            (ENV_TIMEOUT_MODE, "Enforce"),
            (ENV_LIST_CONCURRENCY, "not-a-number"),
            (ENV_LOG_FORMAT, "pretty"),
        ]
        .into_iter()
        .collect();
        let config = OrchestratorConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.validation_budget_ms, 150);
        assert_eq!(config.operation_budget_ms, DEFAULT_OPERATION_BUDGET_MS);
        assert_eq!(config.timeout_mode, TimeoutMode::Enforce);
        assert_eq!(config.list_concurrency, DEFAULT_LIST_CONCURRENCY);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.rules_path.is_none());
    }

    #[test]
    fn test_validate_rejects_inverted_budgets() {
        let config = OrchestratorConfig {
            validation_budget_ms: 500,
            operation_budget_ms: 400,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "operation_budget_ms",
                ..
            })
        ));

        let config = OrchestratorConfig {
            list_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_path_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "validation_budget_ms = 100\nretries = 3").unwrap();
        assert!(matches!(
            OrchestratorConfig::from_path(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_path_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_mode = \"enforce\"\nlist_concurrency = 4").unwrap();
        let config = OrchestratorConfig::from_path(file.path()).unwrap();
        assert_eq!(config.timeout_mode, TimeoutMode::Enforce);
        assert_eq!(config.list_concurrency, 4);
        assert_eq!(config.validation_budget_ms, DEFAULT_VALIDATION_BUDGET_MS);
    }

    #[test]
    fn test_load_rules_appends_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "rules:\n  - id: humor-cap\n    category: personalityRole\n    source: personality.humor\n    comparator: lte\n    threshold: 90"
        )
        .unwrap();
        let config = OrchestratorConfig {
            rules_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let rules = config.load_rules().unwrap();
        assert_eq!(rules.len(), RuleSet::standard().len() + 1);
    }
}
