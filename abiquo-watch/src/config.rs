//! Configuration management for the watcher.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use abiquo_api::ClientConfig;
use abiquo_common::LogFormat;
use abiquo_monitor::MonitorConfig;

use crate::cli::Args;

/// Default configuration location, used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/abiquo/watch.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Abiquo API connection
    #[serde(rename = "api")]
    pub client: ClientConfig,
    /// Polling behaviour
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content).with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Apply environment and CLI overrides, CLI last.
    pub fn with_overrides(self, args: &Args) -> Result<Self> {
        let mut config = self;
        config.monitor = config.monitor.with_env_overrides()?;
        config.with_cli_overrides(args)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Result<Self> {
        if let Some(ref endpoint) = args.endpoint {
            self.client.endpoint = endpoint.clone();
        }

        if let Some(ref user) = args.user {
            self.client.username = user.clone();
        }

        if let Some(ref password) = args.password {
            self.client.password = password.clone();
        }

        if let Some(delay_ms) = args.delay_ms {
            self.monitor.poll_delay_ms = delay_ms;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if let Some(ref format) = args.log_format {
            self.logging.format = format.parse()?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.client.validate().context("Invalid api configuration")?;
        self.monitor.validate().context("Invalid monitor configuration")?;
        Ok(())
    }
}
