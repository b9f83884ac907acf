//! Core error types for Forkline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single task.
///
/// Task bodies fail with arbitrary errors (or panic); the executor flattens
/// them into this serializable form so the failure can be relayed from a
/// worker process to its controller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct TaskError {
    pub message: String,
}

impl TaskError {
    /// Create a task error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Create a task error from a panic payload
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::new(format!("task panicked: {}", detail))
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        // Alternate formatting keeps the whole context chain
        Self::new(format!("{:#}", err))
    }
}

/// Invalid executor settings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("Invalid concurrency {0}: expected 1 (serial), -1 (unbounded) or a positive limit")]
    InvalidConcurrency(i64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_task_error_keeps_context_chain() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("disk full")).context("writing report");
        let task_error = TaskError::from(err.unwrap_err());
        assert_eq!(task_error.message, "writing report: disk full");
    }

    #[test]
    fn test_task_error_from_panic_payloads() {
        let from_str = TaskError::from_panic(Box::new("boom"));
        assert_eq!(from_str.message, "task panicked: boom");

        let from_string = TaskError::from_panic(Box::new(String::from("bang")));
        assert_eq!(from_string.message, "task panicked: bang");

        let other = TaskError::from_panic(Box::new(42_u8));
        assert_eq!(other.message, "task panicked: unknown panic payload");
    }
}
