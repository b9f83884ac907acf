//! Error types for task execution

use forkline_core::TaskError;
use forkline_ipc::IpcError;
use thiserror::Error;

/// Task execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Invalid combination of arguments to a combinator; raised before anything runs
    #[error("Invalid arguments: {0}")]
    Argument(String),

    /// A task rejected or panicked
    #[error(transparent)]
    Task(#[from] TaskError),

    /// A worker was asked for a task name missing from its register
    #[error("Failed to find task \"{0}\"")]
    Lookup(String),

    /// A worker received a command but could not apply it
    #[error("Worker rejected {command}: {reason}")]
    Rejected { command: String, reason: String },

    /// No live connection to a worker process
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),
}

impl ExecutionError {
    pub(crate) fn not_connected() -> Self {
        ExecutionError::Channel("TaskFork is not connected to a worker process".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_errors_are_transparent() {
        let err = ExecutionError::from(TaskError::new("compile failed"));
        assert_eq!(err.to_string(), "compile failed");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ExecutionError::Lookup("lint".to_string()).to_string(),
            "Failed to find task \"lint\""
        );
        let rejected = ExecutionError::Rejected {
            command: "push".to_string(),
            reason: "Failed to find task \"lint\"".to_string(),
        };
        assert_eq!(
            rejected.to_string(),
            "Worker rejected push: Failed to find task \"lint\""
        );
        assert!(ExecutionError::not_connected().to_string().starts_with("Channel error"));
    }
}
