//! Worker process spawning and connection setup

use forkline_ipc::{JsonLineReader, JsonLineWriter, STDIO_CHANNEL, WORKER_CHANNEL_ENV};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::ExecutionError;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// How to launch a worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub envs: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Spawn the worker with piped stdin/stdout and the IPC channel marker set.
    ///
    /// Stderr is inherited so worker logs reach the controller's terminal.
    pub fn spawn(&self) -> Result<Child, ExecutionError> {
        if self.program.as_os_str().is_empty() {
            return Err(ExecutionError::Argument(
                "worker program must not be empty".to_string(),
            ));
        }

        debug!("Spawning worker process: {}", self.program.display());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env(WORKER_CHANNEL_ENV, STDIO_CHANNEL)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        cmd.spawn().map_err(|e| {
            ExecutionError::Channel(format!(
                "Failed to spawn worker {}: {}",
                self.program.display(),
                e
            ))
        })
    }
}

impl From<&str> for WorkerCommand {
    fn from(program: &str) -> Self {
        Self::new(program)
    }
}

impl From<String> for WorkerCommand {
    fn from(program: String) -> Self {
        Self::new(program)
    }
}

impl From<PathBuf> for WorkerCommand {
    fn from(program: PathBuf) -> Self {
        Self::new(program)
    }
}

/// What a [`TaskFork`](crate::TaskFork) binds to
pub enum WorkerHandle {
    /// A worker to spawn
    Command(WorkerCommand),
    /// An already-spawned worker with piped stdin/stdout
    Child(Child),
    /// A raw byte channel to a peer speaking the worker protocol
    Pipe {
        reader: BoxedReader,
        writer: BoxedWriter,
    },
}

impl WorkerHandle {
    pub fn pipe<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        WorkerHandle::Pipe {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    pub(crate) fn connect(self) -> Result<WorkerConnection, ExecutionError> {
        let mut child = match self {
            WorkerHandle::Command(command) => command.spawn()?,
            WorkerHandle::Child(child) => child,
            WorkerHandle::Pipe { reader, writer } => {
                return Ok(WorkerConnection {
                    child: None,
                    reader: JsonLineReader::new(reader),
                    writer: JsonLineWriter::new(writer),
                })
            }
        };

        let (stdout, stdin) = match (child.stdout.take(), child.stdin.take()) {
            (Some(stdout), Some(stdin)) => (stdout, stdin),
            (stdout, _) => {
                // An adopted child may not be kill_on_drop
                if let Err(e) = child.start_kill() {
                    debug!("Failed to kill unusable worker: {}", e);
                }
                let missing = if stdout.is_none() { "stdout" } else { "stdin" };
                return Err(ExecutionError::Channel(format!(
                    "worker {} is not piped",
                    missing
                )));
            }
        };

        Ok(WorkerConnection {
            child: Some(child),
            reader: JsonLineReader::new(Box::new(stdout)),
            writer: JsonLineWriter::new(Box::new(stdin)),
        })
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerHandle::Command(command) => f.debug_tuple("Command").field(command).finish(),
            WorkerHandle::Child(child) => f.debug_tuple("Child").field(&child.id()).finish(),
            WorkerHandle::Pipe { .. } => f.write_str("Pipe"),
        }
    }
}

impl From<WorkerCommand> for WorkerHandle {
    fn from(command: WorkerCommand) -> Self {
        WorkerHandle::Command(command)
    }
}

impl From<Child> for WorkerHandle {
    fn from(child: Child) -> Self {
        WorkerHandle::Child(child)
    }
}

impl From<&str> for WorkerHandle {
    fn from(program: &str) -> Self {
        WorkerHandle::Command(WorkerCommand::new(program))
    }
}

impl From<PathBuf> for WorkerHandle {
    fn from(program: PathBuf) -> Self {
        WorkerHandle::Command(WorkerCommand::new(program))
    }
}

/// Both protocol halves of a bound worker
pub(crate) struct WorkerConnection {
    pub child: Option<Child>,
    pub reader: JsonLineReader<BoxedReader>,
    pub writer: JsonLineWriter<BoxedWriter>,
}
