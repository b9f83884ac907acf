//! Controller-side proxy for an executor living in a worker process

use forkline_core::{EventKind, ExecutorEvent, TaskNames};
use forkline_ipc::{
    ControllerMessage, IpcError, JsonLineReader, JsonLineWriter, MessageEnvelope, MessageId,
    MessageIdSequence, MessageReceiver, MessageSender, WorkerMessage,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ExecutionError;
use crate::listeners::{ListenerId, ListenerTable};
use crate::process::{BoxedReader, BoxedWriter, WorkerHandle};

/// Proxy that drives a [`TaskForkProcess`](crate::TaskForkProcess) over IPC.
///
/// Every command resolves only once the worker acknowledges it. Subscriptions
/// are reference-counted per event kind: the first local listener for a kind
/// asks the worker to forward it, and removing the last one asks it to stop.
///
/// Commands on an unbound fork fail with [`ExecutionError::Channel`] without
/// sending anything.
pub struct TaskFork {
    link: Option<WorkerLink>,
    listeners: Arc<Mutex<ListenerTable>>,
}

struct WorkerLink {
    child: Option<Child>,
    writer: JsonLineWriter<BoxedWriter>,
    ids: MessageIdSequence,
    pending: Arc<Mutex<PendingCommands>>,
    reader: JoinHandle<()>,
    closed: watch::Receiver<bool>,
}

struct PendingCommand {
    command: &'static str,
    reply: oneshot::Sender<Result<(), ExecutionError>>,
}

/// Commands awaiting acknowledgement, keyed by message id
#[derive(Default)]
struct PendingCommands {
    closed: bool,
    entries: HashMap<MessageId, PendingCommand>,
}

impl PendingCommands {
    /// Fail everything still waiting and refuse new entries
    fn close(&mut self, reason: &str) {
        self.closed = true;
        for (id, pending) in self.entries.drain() {
            let _ = pending.reply.send(Err(ExecutionError::Channel(format!(
                "{} before {} #{} was acknowledged",
                reason, pending.command, id
            ))));
        }
    }
}

impl TaskFork {
    pub fn new() -> Self {
        Self {
            link: None,
            listeners: Arc::new(Mutex::new(ListenerTable::default())),
        }
    }

    /// Bind to a worker, first killing any worker already bound
    pub async fn proc(
        &mut self,
        handle: impl Into<WorkerHandle>,
    ) -> Result<&mut Self, ExecutionError> {
        if self.link.is_some() {
            self.kill().await;
        }

        let connection = handle.into().connect()?;
        let pending = Arc::new(Mutex::new(PendingCommands::default()));
        let (closed_tx, closed_rx) = watch::channel(false);

        let reader = tokio::spawn(read_worker_messages(
            connection.reader,
            Arc::clone(&pending),
            Arc::clone(&self.listeners),
            closed_tx,
        ));

        if let Some(pid) = connection.child.as_ref().and_then(Child::id) {
            debug!(pid, "Bound fork to worker process");
        }

        self.link = Some(WorkerLink {
            child: connection.child,
            writer: connection.writer,
            ids: MessageIdSequence::new(),
            pending,
            reader,
            closed: closed_rx,
        });
        Ok(self)
    }

    pub fn is_bound(&self) -> bool {
        self.link.is_some()
    }

    /// OS process id of the bound worker, if it was spawned as a child
    pub fn worker_pid(&self) -> Option<u32> {
        self.link
            .as_ref()
            .and_then(|link| link.child.as_ref())
            .and_then(Child::id)
    }

    /// Append tasks, by register name, to the worker's queue
    pub async fn push(&mut self, names: impl Into<TaskNames>) -> Result<(), ExecutionError> {
        self.send_command(WorkerMessage::push(names)).await
    }

    /// Start the worker's executor
    pub async fn start(&mut self) -> Result<(), ExecutionError> {
        self.send_command(WorkerMessage::start()).await
    }

    /// Subscribe to a forwarded event kind.
    ///
    /// If asking the worker to forward the kind fails, the listener is not kept.
    pub async fn on<F>(
        &mut self,
        kind: EventKind,
        listener: F,
    ) -> Result<ListenerId, ExecutionError>
    where
        F: Fn(&ExecutorEvent) + Send + Sync + 'static,
    {
        if self.link.is_none() {
            return Err(ExecutionError::not_connected());
        }

        let (id, first) = {
            let mut listeners = self.listeners.lock();
            let id = listeners.add(kind, Arc::new(listener));
            (id, listeners.count(kind) == 1)
        };

        if first {
            if let Err(e) = self.send_command(WorkerMessage::register(kind)).await {
                self.listeners.lock().remove(id);
                return Err(e);
            }
        }
        Ok(id)
    }

    /// Unsubscribe; returns whether the listener was still registered
    pub async fn off(&mut self, id: ListenerId) -> Result<bool, ExecutionError> {
        if self.link.is_none() {
            return Err(ExecutionError::not_connected());
        }

        let (removed, last) = {
            let mut listeners = self.listeners.lock();
            let removed = listeners.remove(id);
            (removed, removed && listeners.count(id.kind()) == 0)
        };

        if last {
            self.send_command(WorkerMessage::unregister(id.kind())).await?;
        }
        Ok(removed)
    }

    /// Resolves once the worker channel has closed, or immediately when unbound
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let receiver = self.link.as_ref().map(|link| link.closed.clone());
        async move {
            if let Some(mut receiver) = receiver {
                // A dropped sender also means the reader is gone
                let _ = receiver.wait_for(|closed| *closed).await;
            }
        }
    }

    /// Terminate the bound worker and drop all listeners.
    ///
    /// Waits for a spawned worker to exit. Returns `false` if nothing was bound.
    pub async fn kill(&mut self) -> bool {
        let Some(mut link) = self.link.take() else {
            return false;
        };

        link.reader.abort();
        link.pending.lock().close("worker was killed");
        if let Err(e) = link.writer.close().await {
            debug!("Failed to close worker channel: {}", e);
        }

        if let Some(mut child) = link.child.take() {
            let pid = child.id();
            match child.kill().await {
                Ok(()) => debug!(?pid, "Worker process terminated"),
                Err(e) => warn!(?pid, "Failed to kill worker process: {}", e),
            }
        }

        self.listeners.lock().clear();
        true
    }

    async fn send_command(&mut self, message: WorkerMessage) -> Result<(), ExecutionError> {
        let link = self.link.as_mut().ok_or_else(ExecutionError::not_connected)?;
        let command = message.type_name();
        let id = link.ids.next_id();
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let mut pending = link.pending.lock();
            if pending.closed {
                return Err(ExecutionError::Ipc(IpcError::ConnectionClosed));
            }
            pending.entries.insert(
                id,
                PendingCommand {
                    command,
                    reply: reply_tx,
                },
            );
        }

        if let Err(e) = link.writer.send(&MessageEnvelope::new(id, message)).await {
            link.pending.lock().entries.remove(&id);
            return Err(e.into());
        }
        debug!(id, command, "Sent command to worker");

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Ipc(IpcError::ConnectionClosed)),
        }
    }
}

impl Default for TaskFork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskFork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFork")
            .field("bound", &self.is_bound())
            .field("worker_pid", &self.worker_pid())
            .finish()
    }
}

impl Drop for TaskFork {
    fn drop(&mut self) {
        // The child itself is killed on drop
        if let Some(link) = self.link.take() {
            link.reader.abort();
            link.pending.lock().close("fork was dropped");
        }
    }
}

/// Resolve acknowledgements and dispatch forwarded events until the worker
/// channel closes
async fn read_worker_messages(
    mut reader: JsonLineReader<BoxedReader>,
    pending: Arc<Mutex<PendingCommands>>,
    listeners: Arc<Mutex<ListenerTable>>,
    closed: watch::Sender<bool>,
) {
    loop {
        let received: Result<MessageEnvelope<ControllerMessage>, IpcError> =
            reader.receive().await;

        match received {
            Ok(envelope) => match envelope.message {
                ControllerMessage::Acknowledge { payload } => {
                    let entry = pending.lock().entries.remove(&payload.ack_id);
                    match entry {
                        Some(waiting) => {
                            let result = match payload.error {
                                None => Ok(()),
                                Some(reason) => Err(ExecutionError::Rejected {
                                    command: waiting.command.to_string(),
                                    reason,
                                }),
                            };
                            let _ = waiting.reply.send(result);
                        }
                        None => debug!(
                            ack_id = payload.ack_id,
                            "Ignoring acknowledge without a pending command"
                        ),
                    }
                }
                ControllerMessage::Event { payload } => {
                    let targets = listeners.lock().matching(payload.kind());
                    for listener in targets {
                        listener(&payload);
                    }
                }
            },
            Err(e) if e.is_message_error() => {
                warn!("Skipping malformed message from worker: {}", e);
            }
            Err(e) => {
                debug!("Worker channel closed: {}", e);
                break;
            }
        }
    }

    pending.lock().close("worker channel closed");
    let _ = closed.send(true);
}
