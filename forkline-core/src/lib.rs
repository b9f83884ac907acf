//! Core domain types for Forkline
//!
//! This crate contains the task abstraction and the data model shared by the
//! executor, the worker protocol and the configuration layer. It has minimal
//! dependencies and defines the domain language of the workspace.

pub mod duration;
pub mod error;
pub mod event;
pub mod settings;
pub mod task;

// Re-export commonly used types at the crate root
pub use duration::humanize_millis;
pub use error::{SettingsError, TaskError};
pub use event::{DoneEvent, EndEvent, ErrorEvent, EventKind, ExecutorEvent};
pub use settings::{Concurrency, ExecutorSettings};
pub use task::{Task, TaskFuture, TaskNames, ANONYMOUS_TASK_NAME};
