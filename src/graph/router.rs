//! Memory router: runs before every supervisor turn.
//!
//! Retrieves memories related to the latest user message, injects them as
//! system context, asks the [`WriteJudge`] whether the message is worth
//! remembering and stages a pending write when it is. A message that was
//! already routed is skipped, so re-entry after a worker costs nothing
//! unless the worker introduced a new user message.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::judgment::{WriteDecision, WriteJudge};
use crate::memory::{DEFAULT_MIN_SCORE, DEFAULT_TOP_K, MemoryBackend, Namespaces};
use crate::model::{ConversationState, MemoryHit, Message, PendingMemoryWrite, StateUpdate};

pub struct MemoryRouter {
    backend: Arc<dyn MemoryBackend>,
    namespaces: Namespaces,
    judge: WriteJudge,
}

impl MemoryRouter {
    pub fn new(backend: Arc<dyn MemoryBackend>, namespaces: Namespaces, judge: WriteJudge) -> Self {
        Self {
            backend,
            namespaces,
            judge,
        }
    }

    /// Never fails: a search error is treated as "nothing found".
    pub async fn route(&self, state: &ConversationState) -> StateUpdate {
        let Some(user_message) = state.last_user_text() else {
            return StateUpdate::none();
        };
        if state.last_memory_routed_message.as_deref() == Some(user_message.as_str()) {
            debug!("latest user message already routed");
            return StateUpdate::none();
        }

        let namespace = self.namespaces.for_state(state);
        let related = match self
            .backend
            .search(&namespace, &user_message, DEFAULT_TOP_K, DEFAULT_MIN_SCORE)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "memory search failed during routing");
                Vec::new()
            }
        };

        let mut update = StateUpdate::none().routed(user_message.as_str());
        update.push_message(recall_message(&namespace, &related));
        update.push_message(Message::system(
            "Consider whether this conversation contains a preference or fact worth keeping \
             in long-term memory. If so, call memory_write with a concise note before giving \
             the final answer.",
        ));

        let decision = self.judge.judge(&user_message, &related).await;
        if decision.should_write {
            info!(namespace = %namespace, "staging memory write");
            update.push_message(staged_message(&decision));
            update = update.stage_memory_write(PendingMemoryWrite {
                namespace,
                query: user_message,
                summary: decision.memory_summary,
                reason: decision.reason,
            });
        }
        update
    }
}

fn recall_message(namespace: &str, related: &[MemoryHit]) -> Message {
    if related.is_empty() {
        return Message::system(
            "No related long-term memories were found. Call memory_search if you need them.",
        );
    }
    let lines = related
        .iter()
        .map(|hit| format!("- {}", hit.content))
        .collect::<Vec<_>>()
        .join("\n");
    Message::system(format!("Related long-term memories (namespace: {namespace}):\n{lines}"))
}

fn staged_message(decision: &WriteDecision) -> Message {
    let summary = if decision.memory_summary.is_empty() {
        "(no summary given, write your own)"
    } else {
        decision.memory_summary.as_str()
    };
    let reason = if decision.reason.is_empty() {
        "(none)"
    } else {
        decision.reason.as_str()
    };
    Message::system(format!(
        "The memory assistant recommends saving this to long-term memory.\n\
         Summary: {summary}\n\
         Reason: {reason}\n\
         Save the key points with memory_write before the final answer, or explain why it is not needed."
    ))
}
