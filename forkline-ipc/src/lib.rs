//! Inter-process communication for Forkline
//!
//! This crate provides the command/acknowledge/event protocol and the
//! newline-delimited JSON transport used between a controller and the worker
//! processes it forks.

pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use error::IpcError;
pub use protocol::{
    AcknowledgePayload, ControllerMessage, MessageEnvelope, MessageId, MessageIdSequence,
    PushPayload, StartPayload, SubscriptionPayload, WorkerMessage, STDIO_CHANNEL,
    WORKER_CHANNEL_ENV,
};
pub use transport::{stdio, JsonLineReader, JsonLineWriter, MessageReceiver, MessageSender};
