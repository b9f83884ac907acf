//! Task combinators
//!
//! Composite tasks run a fresh executor per invocation, so the same composite
//! can be run repeatedly and nested inside other composites.

use forkline_core::{Concurrency, EventKind, ExecutorEvent, ExecutorSettings, Task, TaskNames};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::ExecutionError;
use crate::executor::TaskExecutor;
use crate::fork::TaskFork;
use crate::process::WorkerCommand;

/// Display name of unnamed [`serial`] composites
pub const SERIAL_TASK_NAME: &str = "[serial]";
/// Display name of unnamed [`parallel`] composites
pub const PARALLEL_TASK_NAME: &str = "[parallel]";
/// Display name of [`fork`] tasks
pub const FORK_TASK_NAME: &str = "[fork]";

type Outcome = Arc<Mutex<Option<oneshot::Sender<Result<(), ExecutionError>>>>>;

/// Run tasks on a fresh executor.
///
/// Resolves on the first `end` event, or fails with the first task error.
/// Once a task has failed the others keep running, but their results are
/// not observed.
pub async fn exec<I>(tasks: I, settings: Option<ExecutorSettings>) -> Result<(), ExecutionError>
where
    I: IntoIterator<Item = Task>,
{
    let executor = TaskExecutor::new(settings.unwrap_or_default());
    let (tx, rx) = oneshot::channel();
    let outcome: Outcome = Arc::new(Mutex::new(Some(tx)));

    let settled = Arc::clone(&outcome);
    executor.on(EventKind::End, move |_| {
        if let Some(tx) = settled.lock().take() {
            let _ = tx.send(Ok(()));
        }
    });
    let settled = Arc::clone(&outcome);
    executor.on(EventKind::Error, move |event| {
        if let ExecutorEvent::Error(error) = event {
            if let Some(tx) = settled.lock().take() {
                let _ = tx.send(Err(ExecutionError::Task(error.error.clone())));
            }
        }
    });

    executor.push(tasks).start();

    rx.await
        .map_err(|_| ExecutionError::Channel("executor stopped before settling".to_string()))?
}

/// Wrap an asynchronous function as an unnamed task
pub fn task<F, Fut>(f: F) -> Task
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Task::new(f)
}

/// Wrap an asynchronous function as a named task
pub fn task_named<F, Fut>(name: impl Into<String>, f: F) -> Result<Task, ExecutionError>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Ok(Task::new(f).with_name(validate_name(name)?))
}

/// Wrap a synchronous function as an unnamed task
pub fn sync_task<F>(f: F) -> Task
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    Task::from_fn(f)
}

/// Wrap a synchronous function as a named task
pub fn sync_task_named<F>(name: impl Into<String>, f: F) -> Result<Task, ExecutionError>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    Ok(Task::from_fn(f).with_name(validate_name(name)?))
}

/// Compose tasks that run one at a time, in order
pub fn serial<I>(tasks: I, settings: Option<ExecutorSettings>) -> Task
where
    I: IntoIterator<Item = Task>,
{
    composite(SERIAL_TASK_NAME.to_string(), tasks, settings, Concurrency::Serial)
}

pub fn serial_named<I>(
    name: impl Into<String>,
    tasks: I,
    settings: Option<ExecutorSettings>,
) -> Result<Task, ExecutionError>
where
    I: IntoIterator<Item = Task>,
{
    Ok(composite(validate_name(name)?, tasks, settings, Concurrency::Serial))
}

/// Compose tasks that all start at once
pub fn parallel<I>(tasks: I, settings: Option<ExecutorSettings>) -> Task
where
    I: IntoIterator<Item = Task>,
{
    composite(PARALLEL_TASK_NAME.to_string(), tasks, settings, Concurrency::Unbounded)
}

pub fn parallel_named<I>(
    name: impl Into<String>,
    tasks: I,
    settings: Option<ExecutorSettings>,
) -> Result<Task, ExecutionError>
where
    I: IntoIterator<Item = Task>,
{
    Ok(composite(validate_name(name)?, tasks, settings, Concurrency::Unbounded))
}

/// Build a task that runs named tasks inside a freshly spawned worker.
///
/// Each invocation spawns its own worker and kills it once the worker's
/// executor ends or reports an error, or the channel closes.
pub fn fork(
    worker: impl Into<WorkerCommand>,
    names: impl Into<TaskNames>,
) -> Result<Task, ExecutionError> {
    let command = worker.into();
    let names = names.into();

    if command.program.as_os_str().is_empty() {
        return Err(ExecutionError::Argument(
            "fork requires a worker program".to_string(),
        ));
    }
    if names.is_empty() {
        return Err(ExecutionError::Argument(
            "fork requires at least one task name".to_string(),
        ));
    }
    if names.iter().any(|name| name.trim().is_empty()) {
        return Err(ExecutionError::Argument(
            "fork task names must not be blank".to_string(),
        ));
    }

    Ok(Task::named(FORK_TASK_NAME, move || {
        let command = command.clone();
        let names = names.clone();
        async move { run_fork(command, names).await.map_err(anyhow::Error::from) }
    }))
}

fn composite<I>(
    name: String,
    tasks: I,
    settings: Option<ExecutorSettings>,
    concurrency: Concurrency,
) -> Task
where
    I: IntoIterator<Item = Task>,
{
    let settings = settings.unwrap_or_default().with_concurrency(concurrency);
    let tasks: Arc<[Task]> = tasks.into_iter().collect();

    Task::named(name, move || {
        let tasks = Arc::clone(&tasks);
        async move {
            exec(tasks.iter().cloned(), Some(settings))
                .await
                .map_err(anyhow::Error::from)
        }
    })
}

fn validate_name(name: impl Into<String>) -> Result<String, ExecutionError> {
    let name = name.into();
    if name.trim().is_empty() {
        return Err(ExecutionError::Argument(
            "task name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

async fn run_fork(command: WorkerCommand, names: TaskNames) -> Result<(), ExecutionError> {
    let mut fork = TaskFork::new();
    fork.proc(command).await?;

    let result = drive_fork(&mut fork, names).await;

    fork.kill().await;
    debug!("Fork finished");
    result
}

async fn drive_fork(fork: &mut TaskFork, names: TaskNames) -> Result<(), ExecutionError> {
    let (tx, mut rx) = oneshot::channel();
    let outcome: Outcome = Arc::new(Mutex::new(Some(tx)));

    let settled = Arc::clone(&outcome);
    fork.on(EventKind::End, move |_| {
        if let Some(tx) = settled.lock().take() {
            let _ = tx.send(Ok(()));
        }
    })
    .await?;
    let settled = Arc::clone(&outcome);
    fork.on(EventKind::Error, move |event| {
        if let ExecutorEvent::Error(error) = event {
            if let Some(tx) = settled.lock().take() {
                let _ = tx.send(Err(ExecutionError::Task(error.error.clone())));
            }
        }
    })
    .await?;

    fork.push(names).await?;
    fork.start().await?;

    let closed = fork.closed();
    tokio::select! {
        biased;
        settled = &mut rx => return settled.unwrap_or_else(|_| Err(worker_gone())),
        _ = closed => {}
    }

    // Events read just before the channel closed may have settled it
    rx.try_recv().unwrap_or_else(|_| Err(worker_gone()))
}

fn worker_gone() -> ExecutionError {
    ExecutionError::Channel("worker exited before its tasks settled".to_string())
}
