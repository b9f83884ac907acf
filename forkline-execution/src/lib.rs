//! Forkline Execution Engine
//!
//! This crate runs tasks with controllable concurrency, either in-process on a
//! [`TaskExecutor`] or delegated to worker processes through [`TaskFork`] and
//! [`TaskForkProcess`]. The combinators in [`api`] compose tasks into serial,
//! parallel and forked meta tasks.

pub mod api;
pub mod error;
pub mod executor;
pub mod fork;
pub mod listeners;
pub mod process;
pub mod register;
pub mod worker;

// Re-export main types
pub use api::{
    exec, fork, parallel, parallel_named, serial, serial_named, sync_task, sync_task_named, task,
    task_named, FORK_TASK_NAME, PARALLEL_TASK_NAME, SERIAL_TASK_NAME,
};
pub use error::ExecutionError;
pub use executor::TaskExecutor;
pub use fork::TaskFork;
pub use listeners::{EventListener, ListenerId};
pub use process::{WorkerCommand, WorkerHandle};
pub use register::TaskRegister;
pub use worker::TaskForkProcess;

// Re-export the core vocabulary for convenience
pub use forkline_core::{
    Concurrency, DoneEvent, EndEvent, ErrorEvent, EventKind, ExecutorEvent, ExecutorSettings, Task,
    TaskError, TaskNames,
};
