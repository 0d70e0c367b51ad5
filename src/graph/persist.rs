//! Memory persist: commits the staged write against the supervisor's final
//! answer, once, then clears the marker whatever happened.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::memory::MemoryBackend;
use crate::model::{ConversationState, Metadata, PendingMemoryWrite, StateUpdate};

/// Author name of the supervisor's messages.
pub const SUPERVISOR: &str = "supervisor";

/// What the persist step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistResult {
    /// Nothing was staged.
    NothingStaged,
    /// A write was staged but there was no supervisor answer to attach it to.
    Skipped { namespace: String, reason: String },
    Committed { namespace: String, id: String },
    Failed { namespace: String, error: String },
}

pub struct MemoryPersist {
    backend: Arc<dyn MemoryBackend>,
}

impl MemoryPersist {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    /// Commit the staged write. The returned update clears the marker
    /// whenever one was staged.
    pub async fn persist(&self, state: &ConversationState) -> (StateUpdate, PersistResult) {
        let Some(pending) = &state.pending_memory_write else {
            return (StateUpdate::none(), PersistResult::NothingStaged);
        };
        let cleared = StateUpdate::none().clear_pending_memory_write();
        let skipped = |reason: &str| PersistResult::Skipped {
            namespace: pending.namespace.clone(),
            reason: reason.to_string(),
        };

        let Some(answer) = state.last_final_answer() else {
            debug!("no final answer, dropping staged memory write");
            return (cleared, skipped("no final answer"));
        };
        // Unnamed answers are treated as the supervisor's own.
        if answer.name.as_deref().is_some_and(|name| name != SUPERVISOR) {
            debug!(author = ?answer.name, "final answer is not the supervisor's, not persisting");
            return (cleared, skipped("final answer not authored by supervisor"));
        }
        let content = answer.text();
        let content = content.trim();
        if content.is_empty() {
            return (cleared, skipped("empty final answer"));
        }

        let entry = compose_entry(pending, content);
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), json!(SUPERVISOR));

        let result = match self.backend.write(&pending.namespace, &entry, metadata).await {
            Ok(receipt) => {
                info!(namespace = %pending.namespace, id = %receipt.id, "memory persisted");
                PersistResult::Committed {
                    namespace: pending.namespace.clone(),
                    id: receipt.id,
                }
            }
            Err(e) => {
                warn!(namespace = %pending.namespace, error = %e, "memory persist failed, dropping");
                PersistResult::Failed {
                    namespace: pending.namespace.clone(),
                    error: e.to_string(),
                }
            }
        };
        (cleared, result)
    }
}

/// The stored text: summary and reason when present, then the question and
/// the answer, separated by blank lines.
pub fn compose_entry(pending: &PendingMemoryWrite, answer: &str) -> String {
    let mut sections = Vec::with_capacity(4);
    let summary = pending.summary.trim();
    if !summary.is_empty() {
        sections.push(format!("【记忆要点】\n{summary}"));
    }
    let reason = pending.reason.trim();
    if !reason.is_empty() {
        sections.push(format!("【判断依据】\n{reason}"));
    }
    sections.push(format!("【用户问题】\n{}", pending.query));
    sections.push(format!("【最终回答】\n{answer}"));
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_omits_empty_sections() {
        let pending = PendingMemoryWrite {
            namespace: "ns".into(),
            query: "记住我喜欢简洁的回答".into(),
            summary: "用户偏好简洁回答".into(),
            reason: "  ".into(),
        };
        assert_eq!(
            compose_entry(&pending, "好的"),
            "【记忆要点】\n用户偏好简洁回答\n\n【用户问题】\n记住我喜欢简洁的回答\n\n【最终回答】\n好的"
        );
    }
}
