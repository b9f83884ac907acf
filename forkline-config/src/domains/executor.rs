//! Task executor configuration

use forkline_core::{Concurrency, ExecutorSettings};
use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::Validatable;

/// Task executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Tasks executed at once: 1 for serial, -1 for unbounded, N for a hard cap
    #[serde(default = "default_concurrency")]
    pub concurrency: i64,

    /// Suppress per-task log lines
    #[serde(default)]
    pub silent: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            silent: false,
        }
    }
}

impl ExecutorConfig {
    /// Convert into executor settings
    pub fn to_settings(&self) -> ConfigResult<ExecutorSettings> {
        let concurrency = Concurrency::try_from(self.concurrency)
            .map_err(|e| self.validation_error(e.to_string()))?;
        Ok(ExecutorSettings {
            concurrency,
            silent: self.silent,
        })
    }
}

impl Validatable for ExecutorConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.to_settings().map(|_| ())
    }

    fn domain_name(&self) -> &'static str {
        "executor"
    }
}

fn default_concurrency() -> i64 {
    1
}
