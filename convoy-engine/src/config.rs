//! Engine configuration
//!
//! Defines the tunable parameters of the orchestration engine: run
//! concurrency, default timeouts and the retry delay ceiling.

use std::time::Duration;

/// Engine configuration
///
/// All timeouts are configurable to allow tuning for different deployment
/// scenarios (dev vs prod, fast vs slow targets).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of runs driving concurrently
    pub max_concurrent_runs: usize,

    /// Per-attempt stage timeout applied when a stage declares none
    pub default_stage_timeout: Duration,

    /// Approval window applied when an approval config declares none
    pub default_approval_timeout: Duration,

    /// Upper bound on any computed retry backoff delay
    pub max_retry_delay: Duration,

    /// Bound on best-effort rollback execution
    pub rollback_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 8,
            default_stage_timeout: Duration::from_secs(600),
            default_approval_timeout: Duration::from_secs(86_400),
            max_retry_delay: Duration::from_secs(300),
            rollback_timeout: Duration::from_secs(300),
        }
    }
}

impl EngineConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional, seconds unless noted):
    /// - CONVOY_MAX_CONCURRENT_RUNS (count, default: 8)
    /// - CONVOY_STAGE_TIMEOUT (default: 600)
    /// - CONVOY_APPROVAL_TIMEOUT (default: 86400)
    /// - CONVOY_MAX_RETRY_DELAY (default: 300)
    /// - CONVOY_ROLLBACK_TIMEOUT (default: 300)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let max_concurrent_runs = std::env::var("CONVOY_MAX_CONCURRENT_RUNS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.max_concurrent_runs);

        let default_stage_timeout = env_secs("CONVOY_STAGE_TIMEOUT", defaults.default_stage_timeout);
        let default_approval_timeout =
            env_secs("CONVOY_APPROVAL_TIMEOUT", defaults.default_approval_timeout);
        let max_retry_delay = env_secs("CONVOY_MAX_RETRY_DELAY", defaults.max_retry_delay);
        let rollback_timeout = env_secs("CONVOY_ROLLBACK_TIMEOUT", defaults.rollback_timeout);

        let config = Self {
            max_concurrent_runs,
            default_stage_timeout,
            default_approval_timeout,
            max_retry_delay,
            rollback_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_runs == 0 {
            anyhow::bail!("max_concurrent_runs must be greater than 0");
        }
        if self.default_stage_timeout.as_secs() == 0 {
            anyhow::bail!("default_stage_timeout must be greater than 0");
        }
        if self.default_approval_timeout.as_secs() == 0 {
            anyhow::bail!("default_approval_timeout must be greater than 0");
        }
        if self.max_retry_delay.as_secs() == 0 {
            anyhow::bail!("max_retry_delay must be greater than 0");
        }
        Ok(())
    }
}

fn env_secs(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_runs, 8);
        assert_eq!(config.default_stage_timeout, Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());

        config.max_concurrent_runs = 0;
        assert!(config.validate().is_err());

        config.max_concurrent_runs = 4;
        config.default_stage_timeout = Duration::from_secs(0);
        assert!(config.validate().is_err());
    }
}
