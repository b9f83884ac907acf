//! Logging infrastructure for Forkline
//!
//! Everything logs through `tracing`; this crate installs the global
//! subscriber. Worker processes must log to stderr because their stdout is
//! the IPC channel to the controller.

pub mod init;

pub use init::{init_logging_from_config, init_worker_logging_from_config, LogWriter};
