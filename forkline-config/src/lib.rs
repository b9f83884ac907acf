//! Domain-driven configuration management for Forkline
//!
//! Configuration is split by functional domain, loaded from YAML and
//! overridden from `FORKLINE_*` environment variables. Every loaded
//! configuration is validated before it is handed out.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

// Re-export main types
pub use domains::{
    executor::ExecutorConfig,
    fork::ForkConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    ForklineConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;
