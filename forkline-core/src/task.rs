//! Task abstraction
//!
//! A [`Task`] is a zero-argument operation that eventually succeeds or fails,
//! optionally carrying a display name used in log lines. Synchronous and
//! asynchronous bodies are normalized to the same asynchronous contract, and a
//! body that errors or panics always settles as a [`TaskError`].

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::TaskError;

/// Name used in log lines for tasks without a display name
pub const ANONYMOUS_TASK_NAME: &str = "<anonymous>";

/// Future returned by [`Task::run`]
pub type TaskFuture = BoxFuture<'static, Result<(), TaskError>>;

type TaskFn = dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A normalized asynchronous unit of work.
///
/// Cloning is cheap and a task may be invoked any number of times.
#[derive(Clone)]
pub struct Task {
    name: Option<String>,
    run: Arc<TaskFn>,
}

impl Task {
    /// Wrap an asynchronous function
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: None,
            run: Arc::new(move || f().boxed()),
        }
    }

    /// Wrap a named asynchronous function
    pub fn named<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(f).with_name(name)
    }

    /// Wrap a synchronous function.
    ///
    /// The body runs on the executor's thread when the task is polled, so a
    /// long-running body stalls that thread for its whole duration.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self {
            name: None,
            run: Arc::new(move || {
                let f = Arc::clone(&f);
                async move { f() }.boxed()
            }),
        }
    }

    /// Wrap a named synchronous function
    pub fn from_fn_named<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::from_fn(f).with_name(name)
    }

    /// Return the same task under another display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name to use in log lines
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(ANONYMOUS_TASK_NAME)
    }

    /// Invoke the task.
    ///
    /// Errors and panics, whether raised while creating the future or while
    /// polling it, settle the returned future with a [`TaskError`].
    pub fn run(&self) -> TaskFuture {
        let run = Arc::clone(&self.run);
        async move {
            let future = match std::panic::catch_unwind(AssertUnwindSafe(|| run())) {
                Ok(future) => future,
                Err(payload) => return Err(TaskError::from_panic(payload)),
            };
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result.map_err(TaskError::from),
                Err(payload) => Err(TaskError::from_panic(payload)),
            }
        }
        .boxed()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.display_name())
            .finish_non_exhaustive()
    }
}

/// One or more task names, as resolved by a worker's task register.
///
/// Serialized untagged: `"build"` or `["build", "test"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskNames {
    One(String),
    Many(Vec<String>),
}

impl TaskNames {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let names: &[String] = match self {
            TaskNames::One(name) => std::slice::from_ref(name),
            TaskNames::Many(names) => names.as_slice(),
        };
        names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        match self {
            TaskNames::One(_) => 1,
            TaskNames::Many(names) => names.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for TaskNames {
    fn from(name: &str) -> Self {
        TaskNames::One(name.to_string())
    }
}

impl From<String> for TaskNames {
    fn from(name: String) -> Self {
        TaskNames::One(name)
    }
}

impl From<Vec<String>> for TaskNames {
    fn from(names: Vec<String>) -> Self {
        TaskNames::Many(names)
    }
}

impl From<Vec<&str>> for TaskNames {
    fn from(names: Vec<&str>) -> Self {
        TaskNames::Many(names.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for TaskNames {
    fn from(names: [&str; N]) -> Self {
        TaskNames::Many(names.iter().map(|name| name.to_string()).collect())
    }
}
