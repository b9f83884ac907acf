//! The demo pipeline run by `forkline demo`

use anyhow::{Context, Result};
use forkline_config::ForklineConfig;
use forkline_core::{ExecutorSettings, Task};
use forkline_execution::{exec, fork, parallel, serial, sync_task, sync_task_named, WorkerCommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::tasks;

/// Run an async task, a synchronous task, then `workers` parallel chains that
/// each fork a worker process for the CPU-bound work
pub async fn run(
    config: &ForklineConfig,
    workers: usize,
    worker_program: Option<PathBuf>,
) -> Result<()> {
    let settings = config.executor.to_settings()?;
    let worker = worker_command(config, worker_program)?;

    exec([tasks::wait(Duration::from_millis(1500))], Some(settings))
        .await
        .context("Waiting task failed")?;

    exec(
        [sync_task_named(tasks::HARD_WORK, tasks::hard_work)?],
        Some(settings),
    )
    .await
    .context("In-process work failed")?;

    let chains = (1..=workers)
        .map(|n| fork_chain(&worker, n, settings))
        .collect::<Result<Vec<Task>>>()?;

    info!("Forking {} worker processes", workers);
    exec([parallel(chains, Some(settings))], Some(settings))
        .await
        .context("Forked work failed")?;

    Ok(())
}

fn fork_chain(
    worker: &WorkerCommand,
    n: usize,
    settings: ExecutorSettings,
) -> Result<Task> {
    Ok(serial(
        [
            fork(worker.clone(), tasks::HARD_WORK)?,
            sync_task(move || {
                println!("---- Process {} Complete! ----", n);
                Ok(())
            }),
        ],
        Some(settings),
    ))
}

/// Worker command from the CLI flag, then the configuration, then this binary
fn worker_command(config: &ForklineConfig, program: Option<PathBuf>) -> Result<WorkerCommand> {
    let configured = program.or_else(|| config.fork.worker_program.clone());

    match configured {
        Some(program) => Ok(WorkerCommand::new(program).args(&config.fork.worker_args)),
        None => {
            let current_exe =
                std::env::current_exe().context("Failed to locate the forkline binary")?;
            Ok(WorkerCommand::new(current_exe).arg("worker"))
        }
    }
}
