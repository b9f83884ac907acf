//! Worker-side endpoint of the fork protocol

use forkline_core::{EventKind, ExecutorSettings};
use forkline_ipc::{
    stdio, ControllerMessage, IpcError, JsonLineReader, JsonLineWriter, MessageEnvelope,
    MessageIdSequence, MessageReceiver, MessageSender, WorkerMessage, STDIO_CHANNEL,
    WORKER_CHANNEL_ENV,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ExecutionError;
use crate::executor::TaskExecutor;
use crate::register::TaskRegister;

/// Serves a local [`TaskExecutor`] to a controlling [`TaskFork`](crate::TaskFork).
///
/// Commands are applied in arrival order and each is acknowledged exactly
/// once. Executor events are forwarded only for kinds the controller has
/// registered. All outbound messages go through a single writer task, which
/// assigns message ids in send order.
pub struct TaskForkProcess {
    core: Arc<WorkerCore>,
    outbound_rx: Option<mpsc::UnboundedReceiver<ControllerMessage>>,
    serve_task: Option<JoinHandle<Result<(), ExecutionError>>>,
}

struct WorkerCore {
    executor: TaskExecutor,
    register: TaskRegister,
    broadcast: Arc<Mutex<HashMap<EventKind, bool>>>,
    outbound: mpsc::UnboundedSender<ControllerMessage>,
}

impl TaskForkProcess {
    /// Create a worker endpoint around a serial executor
    pub fn new(register: TaskRegister) -> Self {
        Self::with_settings(register, ExecutorSettings::default())
    }

    pub fn with_settings(register: TaskRegister, settings: ExecutorSettings) -> Self {
        let executor = TaskExecutor::new(settings);
        let broadcast = Arc::new(Mutex::new(HashMap::new()));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        for kind in EventKind::ALL {
            let broadcast = Arc::clone(&broadcast);
            let outbound = outbound.clone();
            executor.on(kind, move |event| {
                let enabled = broadcast.lock().get(&kind).copied().unwrap_or(false);
                if enabled {
                    let _ = outbound.send(ControllerMessage::event(event.clone()));
                }
            });
        }

        Self {
            core: Arc::new(WorkerCore {
                executor,
                register,
                broadcast,
                outbound,
            }),
            outbound_rx: Some(outbound_rx),
            serve_task: None,
        }
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.core.executor
    }

    pub fn register(&self) -> &TaskRegister {
        &self.core.register
    }

    /// Whether events of `kind` are currently forwarded to the controller
    pub fn is_broadcasting(&self, kind: EventKind) -> bool {
        self.core
            .broadcast
            .lock()
            .get(&kind)
            .copied()
            .unwrap_or(false)
    }

    /// Start serving over this process's stdin/stdout in the background.
    ///
    /// Fails unless the process was spawned as a worker. Calling it again
    /// once serving is a no-op.
    pub fn init(&mut self) -> Result<&mut Self, ExecutionError> {
        if self.serve_task.is_some() {
            return Ok(self);
        }

        match std::env::var(WORKER_CHANNEL_ENV) {
            Ok(channel) if channel == STDIO_CHANNEL => {}
            Ok(channel) => {
                return Err(ExecutionError::Channel(format!(
                    "Unsupported worker channel {:?}",
                    channel
                )))
            }
            Err(_) => {
                return Err(ExecutionError::Channel(format!(
                    "Not running as a worker process: {} is not set",
                    WORKER_CHANNEL_ENV
                )))
            }
        }

        let outbound_rx = self.take_outbound()?;
        let (reader, writer) = stdio();
        let core = Arc::clone(&self.core);
        self.serve_task = Some(tokio::spawn(run_protocol(core, outbound_rx, reader, writer)));

        info!("Worker process ready, serving {} tasks", self.core.register.len());
        Ok(self)
    }

    /// Serve the protocol over the given byte streams until the controller
    /// closes its end
    pub async fn serve<R, W>(&mut self, reader: R, writer: W) -> Result<(), ExecutionError>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let outbound_rx = self.take_outbound()?;
        run_protocol(
            Arc::clone(&self.core),
            outbound_rx,
            JsonLineReader::new(reader),
            JsonLineWriter::new(writer),
        )
        .await
    }

    /// Wait for the background server started by [`init`](Self::init) to finish
    pub async fn closed(&mut self) -> Result<(), ExecutionError> {
        match self.serve_task.take() {
            Some(task) => task
                .await
                .map_err(|e| ExecutionError::Channel(format!("Worker server failed: {}", e)))?,
            None => Ok(()),
        }
    }

    /// Stop the background server, if any
    pub fn shutdown(&mut self) {
        if let Some(task) = self.serve_task.take() {
            task.abort();
        }
    }

    fn take_outbound(
        &mut self,
    ) -> Result<mpsc::UnboundedReceiver<ControllerMessage>, ExecutionError> {
        self.outbound_rx.take().ok_or_else(|| {
            ExecutionError::Channel("Worker process is already serving".to_string())
        })
    }
}

impl Drop for TaskForkProcess {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskForkProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskForkProcess")
            .field("executor", &self.core.executor)
            .field("register", &self.core.register)
            .field("serving", &self.serve_task.is_some())
            .finish()
    }
}

async fn run_protocol<R, W>(
    core: Arc<WorkerCore>,
    outbound_rx: mpsc::UnboundedReceiver<ControllerMessage>,
    mut reader: JsonLineReader<R>,
    writer: JsonLineWriter<W>,
) -> Result<(), ExecutionError>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let writer_task = tokio::spawn(write_controller_messages(outbound_rx, writer));

    let result = loop {
        let received: Result<MessageEnvelope<WorkerMessage>, IpcError> = reader.receive().await;
        match received {
            Ok(envelope) => core.handle(envelope),
            Err(e) if e.is_message_error() => {
                warn!("Skipping malformed message from controller: {}", e);
            }
            Err(IpcError::ConnectionClosed) => {
                debug!("Controller closed the worker channel");
                break Ok(());
            }
            Err(e) => break Err(ExecutionError::from(e)),
        }
    };

    writer_task.abort();
    result
}

async fn write_controller_messages<W>(
    mut outbound_rx: mpsc::UnboundedReceiver<ControllerMessage>,
    mut writer: JsonLineWriter<W>,
) where
    W: AsyncWrite + Send + Unpin + 'static,
{
    let mut ids = MessageIdSequence::new();
    while let Some(message) = outbound_rx.recv().await {
        let envelope = MessageEnvelope::new(ids.next_id(), message);
        if let Err(e) = writer.send(&envelope).await {
            warn!("Failed to send {} to controller: {}", envelope.message.type_name(), e);
            break;
        }
    }
}

impl WorkerCore {
    fn handle(&self, envelope: MessageEnvelope<WorkerMessage>) {
        let id = envelope.id;
        debug!(id, command = envelope.message.type_name(), "Received command");

        let reply = match envelope.message {
            WorkerMessage::Push { payload } => match self.register.resolve(&payload.task_names) {
                Ok(tasks) => {
                    self.executor.push(tasks);
                    ControllerMessage::acknowledge(id)
                }
                Err(e) => {
                    warn!("Rejecting push #{}: {}", id, e);
                    ControllerMessage::reject(id, e.to_string())
                }
            },
            WorkerMessage::Start { .. } => {
                self.executor.start();
                ControllerMessage::acknowledge(id)
            }
            WorkerMessage::Register { payload } => {
                self.broadcast.lock().insert(payload.event, true);
                ControllerMessage::acknowledge(id)
            }
            WorkerMessage::Unregister { payload } => {
                self.broadcast.lock().insert(payload.event, false);
                ControllerMessage::acknowledge(id)
            }
        };

        if self.outbound.send(reply).is_err() {
            debug!(id, "Outbound channel closed, dropping acknowledge");
        }
    }
}
