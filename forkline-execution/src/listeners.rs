//! Event listener bookkeeping shared by executors and fork proxies

use forkline_core::{EventKind, ExecutorEvent};
use std::sync::Arc;

/// Callback invoked with each matching executor event
pub type EventListener = Arc<dyn Fn(&ExecutorEvent) + Send + Sync>;

/// Handle returned when subscribing, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId {
    kind: EventKind,
    seq: u64,
}

impl ListenerId {
    /// Event this listener is subscribed to
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// Listeners keyed by event kind, in subscription order
#[derive(Default)]
pub(crate) struct ListenerTable {
    next_seq: u64,
    entries: Vec<(ListenerId, EventListener)>,
}

impl ListenerTable {
    pub(crate) fn add(&mut self, kind: EventKind, listener: EventListener) -> ListenerId {
        let id = ListenerId {
            kind,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn count(&self, kind: EventKind) -> usize {
        self.entries.iter().filter(|(id, _)| id.kind == kind).count()
    }

    /// Snapshot of the listeners for `kind`, so callbacks run without the table borrowed
    pub(crate) fn matching(&self, kind: EventKind) -> Vec<EventListener> {
        self.entries
            .iter()
            .filter(|(id, _)| id.kind == kind)
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
