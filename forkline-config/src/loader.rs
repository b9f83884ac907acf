//! Configuration loading and environment variable handling

use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::domains::logging::{LogFormat, LogLevel};
use crate::domains::ForklineConfig;
use crate::error::{ConfigError, ConfigResult};

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "FORKLINE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<ForklineConfig> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let mut config: ForklineConfig = if content.trim().is_empty() {
            ForklineConfig::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<ForklineConfig> {
        let mut config = ForklineConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<ForklineConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut ForklineConfig) -> ConfigResult<()> {
        self.apply_executor_overrides(&mut config.executor)?;
        self.apply_logging_overrides(&mut config.logging)?;
        self.apply_fork_overrides(&mut config.fork);
        Ok(())
    }

    /// Apply executor config overrides
    fn apply_executor_overrides(
        &self,
        config: &mut crate::domains::executor::ExecutorConfig,
    ) -> ConfigResult<()> {
        if let Ok(concurrency) = self.get_env_var("CONCURRENCY") {
            config.concurrency = concurrency
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid CONCURRENCY: {}", e)))?;
        }

        if let Ok(silent) = self.get_env_var("SILENT") {
            config.silent = silent
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid SILENT: {}", e)))?;
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Apply worker process config overrides
    fn apply_fork_overrides(&self, config: &mut crate::domains::fork::ForkConfig) {
        if let Ok(program) = self.get_env_var("WORKER_PROGRAM") {
            config.worker_program = Some(PathBuf::from(program));
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
