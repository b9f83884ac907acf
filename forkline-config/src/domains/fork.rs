//! Worker process configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};

/// Worker process configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForkConfig {
    /// Program spawned as a worker. Unset means the running binary itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_program: Option<PathBuf>,

    /// Arguments passed to the worker program
    #[serde(default)]
    pub worker_args: Vec<String>,
}

impl Validatable for ForkConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(program) = &self.worker_program {
            validate_required_string(
                &program.to_string_lossy(),
                "worker_program",
                self.domain_name(),
            )?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "fork"
    }
}
