//! Per-turn conversation state and partial-update merge.
//!
//! Graph nodes never mutate [`ConversationState`] directly. They return a
//! [`StateUpdate`] carrying only the fields they change; the executor
//! applies it. Messages append, every other field overwrites when set.

use serde::{Deserialize, Serialize};

use super::message::{Message, Role};

/// Identity used when the caller supplied neither `user_id` nor `user_name`.
pub const ANONYMOUS_USER: &str = "anonymous";

/// A long-term memory write staged by the router and committed by the persist node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMemoryWrite {
    pub namespace: String,
    /// The user message that triggered the write.
    pub query: String,
    pub summary: String,
    pub reason: String,
}

/// The working dataset produced by a data-retrieval tool (e.g. a CSV export).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRef {
    pub path: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub dataset: Option<DatasetRef>,
    #[serde(default)]
    pub pending_memory_write: Option<PendingMemoryWrite>,
    #[serde(default)]
    pub last_memory_routed_message: Option<String>,
}

impl ConversationState {
    /// Start a turn from a single user message.
    pub fn from_user_message(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(text.into())],
            ..Self::default()
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    /// Caller identity for namespace resolution: `user_id`, then `user_name`,
    /// then [`ANONYMOUS_USER`].
    pub fn identity(&self) -> &str {
        let present = |id: &&str| !id.trim().is_empty();
        self.user_id
            .as_deref()
            .filter(present)
            .or_else(|| self.user_name.as_deref().filter(present))
            .unwrap_or(ANONYMOUS_USER)
    }

    /// Flat text of the most recent user-authored message, if non-empty.
    pub fn last_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(Message::text)
            .filter(|text| !text.trim().is_empty())
    }

    /// Most recent assistant message that is not waiting on tool calls.
    pub fn last_final_answer(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_final_answer())
    }

    /// Merge a partial update into this state.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        if let Some(pending) = update.pending_memory_write {
            self.pending_memory_write = pending;
        }
        if let Some(routed) = update.last_memory_routed_message {
            self.last_memory_routed_message = Some(routed);
        }
        if let Some(dataset) = update.dataset {
            self.dataset = Some(dataset);
        }
    }
}

/// Partial state update returned by a node or tool.
///
/// `pending_memory_write` is tri-state: `None` leaves the field alone,
/// `Some(None)` clears it, `Some(Some(_))` stages a new write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub pending_memory_write: Option<Option<PendingMemoryWrite>>,
    pub last_memory_routed_message: Option<String>,
    pub dataset: Option<DatasetRef>,
}

impl StateUpdate {
    /// The no-op update.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.pending_memory_write.is_none()
            && self.last_memory_routed_message.is_none()
            && self.dataset.is_none()
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn stage_memory_write(mut self, pending: PendingMemoryWrite) -> Self {
        self.pending_memory_write = Some(Some(pending));
        self
    }

    pub fn clear_pending_memory_write(mut self) -> Self {
        self.pending_memory_write = Some(None);
        self
    }

    pub fn routed(mut self, message: impl Into<String>) -> Self {
        self.last_memory_routed_message = Some(message.into());
        self
    }

    pub fn with_dataset(mut self, dataset: DatasetRef) -> Self {
        self.dataset = Some(dataset);
        self
    }

    /// Fold a later update into this one, preserving message order.
    pub fn merge(&mut self, later: StateUpdate) {
        self.messages.extend(later.messages);
        if later.pending_memory_write.is_some() {
            self.pending_memory_write = later.pending_memory_write;
        }
        if later.last_memory_routed_message.is_some() {
            self.last_memory_routed_message = later.last_memory_routed_message;
        }
        if later.dataset.is_some() {
            self.dataset = later.dataset;
        }
    }
}
