//! Domain-specific configuration modules

pub mod executor;
pub mod fork;
pub mod logging;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Forkline configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ForklineConfig {
    /// Task executor configuration
    #[serde(default)]
    pub executor: executor::ExecutorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Worker process configuration
    #[serde(default)]
    pub fork: fork::ForkConfig,
}

impl ForklineConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.executor.validate()?;
        self.logging.validate()?;
        self.fork.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = ForklineConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
