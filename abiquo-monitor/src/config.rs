//! Configuration for the monitoring service.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::MonitorError;

/// Environment variable overriding [`MonitorConfig::poll_delay_ms`].
pub const ENV_POLL_DELAY_MS: &str = "ABIQUO_MONITOR_DELAY_MS";
/// Environment variable overriding [`MonitorConfig::max_scheduler_threads`].
pub const ENV_SCHEDULER_THREADS: &str = "ABIQUO_SCHEDULER_THREADS";

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Delay between two polls of the same monitor call, in milliseconds
    pub poll_delay_ms: u64,
    /// Worker threads of the shared scheduler (0 = single, non-concurrent)
    pub max_scheduler_threads: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_delay_ms: 5000,
            max_scheduler_threads: 10,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read monitor config: {}", path.display()))?;

        let config: MonitorConfig =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse monitor config")?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `ABIQUO_MONITOR_DELAY_MS` / `ABIQUO_SCHEDULER_THREADS`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(ENV_POLL_DELAY_MS) {
            self.poll_delay_ms = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds", ENV_POLL_DELAY_MS))?;
        }

        if let Some(value) = lookup(ENV_SCHEDULER_THREADS) {
            self.max_scheduler_threads = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a thread count", ENV_SCHEDULER_THREADS))?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), MonitorError> {
        if self.poll_delay_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "poll_delay_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.poll_delay(), Duration::from_secs(5));
        assert_eq!(config.max_scheduler_threads, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_delay_ms: 1000").unwrap();

        let config = MonitorConfig::load(file.path()).unwrap();
        assert_eq!(config.poll_delay_ms, 1000);
        assert_eq!(config.max_scheduler_threads, 10);
    }

    #[test]
    fn test_load_rejects_zero_delay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_delay_ms: 0\nmax_scheduler_threads: 0").unwrap();

        assert!(MonitorConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(MonitorConfig::load("/nonexistent/abiquo-monitor.yaml").is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [(ENV_POLL_DELAY_MS, "250"), (ENV_SCHEDULER_THREADS, " 0 ")]
            .into_iter()
            .collect();

        let config = MonitorConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.poll_delay_ms, 250);
        assert_eq!(config.max_scheduler_threads, 0);
    }

    #[test]
    fn test_invalid_override() {
        let result = MonitorConfig::default().with_overrides(|key| {
            (key == ENV_POLL_DELAY_MS).then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }
}
