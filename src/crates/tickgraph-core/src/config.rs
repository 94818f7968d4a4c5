//! Engine configuration
//!
//! [`EngineConfig`] controls the scheduler's resource limits. Every field has
//! a default, so a config file only needs the keys it changes:
//!
//! ```toml
//! max_concurrency = 8
//! max_rounds = 200
//!
//! [retry]
//! enabled = true
//! initial_interval = 0.05
//! ```

use crate::error::{GraphError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default global worker budget (concurrent state invocations)
pub const DEFAULT_MAX_CONCURRENCY: usize = 20;

/// Default per-token retry budget
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Scheduler limits and policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of state invocations running at once across the engine
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Maximum number of rounds a single run may tick
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Maximum number of batch executions in flight at once
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    /// Retry budget given to every new process token
    #[serde(default = "default_retry_budget")]
    pub default_retry_budget: u32,

    /// Retry behaviour for failed invocations
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_max_rounds() -> usize {
    1000
}

fn default_batch_concurrency() -> usize {
    4
}

fn default_retry_budget() -> u32 {
    DEFAULT_RETRY_BUDGET
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_rounds: default_max_rounds(),
            batch_concurrency: default_batch_concurrency(),
            default_retry_budget: default_retry_budget(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| GraphError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self)
            .map_err(|e| GraphError::Configuration(format!("Failed to render config: {}", e)))
    }

    /// Reject limits the scheduler cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(GraphError::Configuration(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_rounds == 0 {
            return Err(GraphError::Configuration(
                "max_rounds must be at least 1".to_string(),
            ));
        }
        if self.batch_concurrency == 0 {
            return Err(GraphError::Configuration(
                "batch_concurrency must be at least 1".to_string(),
            ));
        }
        let retry = &self.retry;
        if !(retry.initial_interval.is_finite()
            && retry.max_interval.is_finite()
            && retry.backoff_factor.is_finite())
        {
            return Err(GraphError::Configuration(
                "retry intervals and backoff_factor must be finite".to_string(),
            ));
        }
        if retry.backoff_factor < 1.0 || retry.initial_interval < 0.0 {
            return Err(GraphError::Configuration(
                "retry backoff_factor must be >= 1.0 and initial_interval >= 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the global worker budget
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the round limit
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Set how many batch executions may run at once
    pub fn with_batch_concurrency(mut self, batch_concurrency: usize) -> Self {
        self.batch_concurrency = batch_concurrency;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrency, 20);
        assert_eq!(config.max_rounds, 1000);
        assert_eq!(config.default_retry_budget, 3);
        assert!(!config.retry.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
max_concurrency = 4

[retry]
enabled = true
jitter = false
"#,
        )
        .unwrap();

        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.max_rounds, 1000);
        assert!(config.retry.enabled);
        assert!(!config.retry.jitter);
        assert_eq!(config.retry.backoff_factor, 2.0);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = EngineConfig::from_toml_str("max_concurrency = 0");
        assert!(matches!(result, Err(GraphError::Configuration(_))));
    }

    #[test]
    fn test_non_finite_retry_intervals_rejected() {
        for toml in [
            "[retry]\ninitial_interval = inf",
            "[retry]\nmax_interval = inf",
            "[retry]\nbackoff_factor = nan",
        ] {
            let result = EngineConfig::from_toml_str(toml);
            assert!(
                matches!(result, Err(GraphError::Configuration(_))),
                "accepted: {}",
                toml
            );
        }

        let config = EngineConfig::default()
            .with_retry(RetryPolicy::enabled().with_initial_interval(f64::INFINITY));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_rounds = 42").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_rounds, 42);
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let rendered = EngineConfig::default().to_toml_string().unwrap();
        let parsed = EngineConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, EngineConfig::default());
    }
}
