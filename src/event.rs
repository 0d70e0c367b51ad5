//! Structured events emitted by the graph executor.
//!
//! Events are the executor's account of a turn: which nodes ran, where
//! control was handed, and what happened to the staged memory write. They
//! are returned with the turn outcome rather than pushed anywhere, so a
//! caller can log, store or discard them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A structured event emitted during a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic within a turn, starting at 0.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    NodeEntered {
        node: String,
    },
    Handoff {
        from: String,
        to: String,
    },
    MemoryWriteStaged {
        namespace: String,
        summary: String,
    },
    MemoryWriteCommitted {
        namespace: String,
        id: String,
    },
    MemoryWriteDropped {
        namespace: String,
        reason: String,
    },
    TurnCompleted {
        steps: usize,
    },
}

/// Sequenced collector for one turn's events.
#[derive(Debug, Default)]
pub struct EventLog {
    next_seq: u64,
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, kind: EventKind) {
        self.events.push(Event {
            seq: self.next_seq,
            timestamp: Utc::now(),
            kind,
        });
        self.next_seq += 1;
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}
