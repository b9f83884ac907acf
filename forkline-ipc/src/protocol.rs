//! IPC protocol definitions and message types
//!
//! Every message crossing the channel is one JSON object:
//!
//! ```text
//! controller -> worker : { id, type: push|start|register|unregister, payload }
//! worker -> controller : { id, type: acknowledge|event, payload }
//! ```
//!
//! Ids are unique and increase monotonically per direction per connection.
//! Each command is answered by exactly one acknowledge naming its id.

use forkline_core::{EventKind, ExecutorEvent, TaskNames};
use serde::{Deserialize, Serialize};

/// Environment variable set on spawned workers, naming the channel they talk on
pub const WORKER_CHANNEL_ENV: &str = "FORKLINE_WORKER_CHANNEL";

/// Value of [`WORKER_CHANNEL_ENV`] for workers talking over stdin/stdout
pub const STDIO_CHANNEL: &str = "stdio";

pub type MessageId = u64;

/// Per-direction message id counter
#[derive(Debug, Default)]
pub struct MessageIdSequence {
    next: MessageId,
}

impl MessageIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the next message id and advance the counter
    pub fn next_id(&mut self) -> MessageId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Message envelope for all IPC communications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub id: MessageId,
    #[serde(flatten)]
    pub message: T,
}

impl<T> MessageEnvelope<T> {
    pub fn new(id: MessageId, message: T) -> Self {
        Self { id, message }
    }
}

/// Messages sent from a controller to a worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Append tasks, by register name, to the worker's queue
    Push { payload: PushPayload },

    /// Start executing the worker's queue
    Start { payload: StartPayload },

    /// Begin forwarding an executor event
    Register { payload: SubscriptionPayload },

    /// Stop forwarding an executor event
    Unregister { payload: SubscriptionPayload },
}

impl WorkerMessage {
    pub fn push(task_names: impl Into<TaskNames>) -> Self {
        WorkerMessage::Push {
            payload: PushPayload {
                task_names: task_names.into(),
            },
        }
    }

    pub fn start() -> Self {
        WorkerMessage::Start {
            payload: StartPayload {},
        }
    }

    pub fn register(event: EventKind) -> Self {
        WorkerMessage::Register {
            payload: SubscriptionPayload { event },
        }
    }

    pub fn unregister(event: EventKind) -> Self {
        WorkerMessage::Unregister {
            payload: SubscriptionPayload { event },
        }
    }

    /// Wire name of the message type
    pub fn type_name(&self) -> &'static str {
        match self {
            WorkerMessage::Push { .. } => "push",
            WorkerMessage::Start { .. } => "start",
            WorkerMessage::Register { .. } => "register",
            WorkerMessage::Unregister { .. } => "unregister",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub task_names: TaskNames,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPayload {
    pub event: EventKind,
}

/// Messages sent from worker processes to their controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerMessage {
    /// A command was received and applied (or rejected, see `error`)
    Acknowledge { payload: AcknowledgePayload },

    /// A forwarded executor event
    Event { payload: ExecutorEvent },
}

impl ControllerMessage {
    pub fn acknowledge(ack_id: MessageId) -> Self {
        ControllerMessage::Acknowledge {
            payload: AcknowledgePayload {
                ack_id,
                error: None,
            },
        }
    }

    /// Acknowledge a command the worker could not apply
    pub fn reject(ack_id: MessageId, error: impl Into<String>) -> Self {
        ControllerMessage::Acknowledge {
            payload: AcknowledgePayload {
                ack_id,
                error: Some(error.into()),
            },
        }
    }

    pub fn event(event: ExecutorEvent) -> Self {
        ControllerMessage::Event { payload: event }
    }

    /// Wire name of the message type
    pub fn type_name(&self) -> &'static str {
        match self {
            ControllerMessage::Acknowledge { .. } => "acknowledge",
            ControllerMessage::Event { .. } => "event",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgePayload {
    /// Id of the command this acknowledges
    pub ack_id: MessageId,
    /// Why the command could not be applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use forkline_core::{DoneEvent, EndEvent};
    use serde_json::json;

    #[test]
    fn test_id_sequence_is_monotonic() {
        let mut ids = MessageIdSequence::new();
        assert_eq!(ids.next_id(), 0);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
    }

    #[test]
    fn test_worker_message_wire_shape() {
        let envelope = MessageEnvelope::new(3, WorkerMessage::push(["build", "test"]));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"id": 3, "type": "push", "payload": {"taskNames": ["build", "test"]}})
        );

        let start = MessageEnvelope::new(4, WorkerMessage::start());
        assert_eq!(
            serde_json::to_value(&start).unwrap(),
            json!({"id": 4, "type": "start", "payload": {}})
        );

        let parsed: MessageEnvelope<WorkerMessage> = serde_json::from_value(
            json!({"id": 5, "type": "register", "payload": {"event": "end"}}),
        )
        .unwrap();
        assert_eq!(parsed.id, 5);
        assert_eq!(parsed.message, WorkerMessage::register(EventKind::End));
        assert_eq!(parsed.message.type_name(), "register");
    }

    #[test]
    fn test_single_task_name_push() {
        let parsed: MessageEnvelope<WorkerMessage> = serde_json::from_value(
            json!({"id": 0, "type": "push", "payload": {"taskNames": "hard_work"}}),
        )
        .unwrap();
        assert_eq!(parsed.message, WorkerMessage::push("hard_work"));
    }

    #[test]
    fn test_controller_message_wire_shape() {
        let ack = MessageEnvelope::new(0, ControllerMessage::acknowledge(7));
        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            json!({"id": 0, "type": "acknowledge", "payload": {"ackId": 7}})
        );

        let reject = MessageEnvelope::new(1, ControllerMessage::reject(8, "missing"));
        assert_eq!(
            serde_json::to_value(&reject).unwrap(),
            json!({"id": 1, "type": "acknowledge", "payload": {"ackId": 8, "error": "missing"}})
        );

        let done = MessageEnvelope::new(
            2,
            ControllerMessage::event(ExecutorEvent::Done(DoneEvent { elapsed_ms: 40 })),
        );
        assert_eq!(
            serde_json::to_value(&done).unwrap(),
            json!({"id": 2, "type": "event", "payload": {"event": "done", "data": {"elapsedMs": 40}}})
        );

        let end: MessageEnvelope<ControllerMessage> = serde_json::from_value(
            json!({"id": 9, "type": "event", "payload": {"event": "end", "data": {}}}),
        )
        .unwrap();
        assert_eq!(
            end.message,
            ControllerMessage::event(ExecutorEvent::End(EndEvent {}))
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let parsed = serde_json::from_value::<MessageEnvelope<WorkerMessage>>(
            json!({"id": 0, "type": "", "payload": null}),
        );
        assert!(parsed.is_err());
    }
}
