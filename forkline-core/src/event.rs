//! Executor lifecycle events

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TaskError;

/// Kind of an executor event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A task resolved
    Done,
    /// A task rejected
    Error,
    /// The queue is empty and the last running task finished
    End,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Done, EventKind::Error, EventKind::End];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Done => "done",
            EventKind::Error => "error",
            EventKind::End => "end",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneEvent {
    /// Time from dequeue to settlement, in milliseconds
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Time from dequeue to settlement, in milliseconds
    pub elapsed_ms: u64,
    pub error: TaskError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndEvent {}

/// Event emitted by a task executor.
///
/// Serializes as `{"event": "<kind>", "data": {...}}`, the shape relayed from
/// worker processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ExecutorEvent {
    Done(DoneEvent),
    Error(ErrorEvent),
    End(EndEvent),
}

impl ExecutorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ExecutorEvent::Done(_) => EventKind::Done,
            ExecutorEvent::Error(_) => EventKind::Error,
            ExecutorEvent::End(_) => EventKind::End,
        }
    }
}
