//! Executor settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;

use crate::error::SettingsError;

/// How many tasks an executor may run at once.
///
/// Serialized as a plain integer: `1` is serial, `-1` is unbounded and any
/// larger positive number is a hard cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Concurrency {
    #[default]
    Serial,
    Unbounded,
    Limited(NonZeroUsize),
}

impl Concurrency {
    /// A hard cap of `limit` tasks. A cap of zero would never run anything.
    pub fn limited(limit: usize) -> Result<Self, SettingsError> {
        NonZeroUsize::new(limit)
            .map(Concurrency::Limited)
            .ok_or(SettingsError::InvalidConcurrency(0))
    }

    /// Whether `running` in-flight tasks leave room for one more
    pub fn allows(&self, running: usize) -> bool {
        match self {
            Concurrency::Serial => running < 1,
            Concurrency::Unbounded => true,
            Concurrency::Limited(limit) => running < limit.get(),
        }
    }
}

impl TryFrom<i64> for Concurrency {
    type Error = SettingsError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Concurrency::Serial),
            -1 => Ok(Concurrency::Unbounded),
            n if n > 1 => usize::try_from(n)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(Concurrency::Limited)
                .ok_or(SettingsError::InvalidConcurrency(value)),
            _ => Err(SettingsError::InvalidConcurrency(value)),
        }
    }
}

impl From<Concurrency> for i64 {
    fn from(concurrency: Concurrency) -> Self {
        match concurrency {
            Concurrency::Serial => 1,
            Concurrency::Unbounded => -1,
            Concurrency::Limited(limit) => i64::try_from(limit.get()).unwrap_or(i64::MAX),
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concurrency::Serial => write!(f, "serial"),
            Concurrency::Unbounded => write!(f, "unbounded"),
            Concurrency::Limited(limit) => write!(f, "{} at once", limit),
        }
    }
}

/// Settings used by a task executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Number of tasks that can be executed at once
    pub concurrency: Concurrency,
    /// Suppress per-task log lines. Events are emitted regardless.
    pub silent: bool,
}

impl ExecutorSettings {
    pub fn serial() -> Self {
        Self {
            concurrency: Concurrency::Serial,
            ..Default::default()
        }
    }

    pub fn unbounded() -> Self {
        Self {
            concurrency: Concurrency::Unbounded,
            ..Default::default()
        }
    }

    /// Builder pattern for the silent flag
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Builder pattern for the concurrency
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }
}
