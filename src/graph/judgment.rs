//! Write-worthiness judgment: one LLM call deciding whether the latest user
//! message holds something worth keeping in long-term memory.
//!
//! This is a soft heuristic. Call failures and unparseable replies both
//! mean "do not write".

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::llm::{ChatModel, ChatRequest};
use crate::model::{MemoryHit, Message};
use crate::telemetry::metrics;

const JUDGE_PREAMBLE: &str = "You manage a user's long-term memory. Decide whether the \
user's latest message contains a durable preference, background fact or other \
information that will help future conversations. One-off questions and transient \
requests are not worth keeping.\n\
Reply with a JSON object with the fields:\n\
  - \"should_write\": boolean, whether to store it.\n\
  - \"memory_summary\": if storing, one or two sentences with the key point; otherwise \"\".\n\
  - \"reason\": a short justification.";

const CONTEXT_LIMIT: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteDecision {
    pub should_write: bool,
    pub memory_summary: String,
    pub reason: String,
}

impl WriteDecision {
    fn declined(reason: &str) -> Self {
        Self {
            should_write: false,
            memory_summary: String::new(),
            reason: reason.to_string(),
        }
    }

    /// Interpret a model reply. Anything but a JSON object is a refusal.
    pub fn from_reply(text: &str) -> Self {
        let Some(object) = extract_json_object(text) else {
            return Self::declined("parse_failure");
        };
        Self {
            should_write: object.get("should_write").is_some_and(truthy),
            memory_summary: string_field(&object, "memory_summary"),
            reason: string_field(&object, "reason"),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Find the first JSON object in `text`.
///
/// Tries the whole text, then the text with a surrounding code fence
/// removed, then every `{` in order until one starts a valid object.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(map);
    }
    let unfenced = strip_fence(trimmed);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(unfenced) {
        return Some(map);
    }
    unfenced
        .match_indices('{')
        .find_map(|(start, _)| first_object_at(&unfenced[start..]))
}

fn first_object_at(text: &str) -> Option<Map<String, Value>> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
    match stream.next() {
        Some(Ok(Value::Object(map))) => Some(map),
        _ => None,
    }
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    let rest = rest.trim();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Makes the judgment call.
pub struct WriteJudge {
    model: Arc<dyn ChatModel>,
}

impl WriteJudge {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn judge(&self, user_message: &str, related: &[MemoryHit]) -> WriteDecision {
        let context = if related.is_empty() {
            "(no related memories)".to_string()
        } else {
            related
                .iter()
                .take(CONTEXT_LIMIT)
                .map(|hit| format!("- {}", hit.content))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let request = ChatRequest::new(vec![
            Message::system(JUDGE_PREAMBLE),
            Message::user(format!(
                "Latest user message:\n{}\n\nExisting related memories:\n{context}\n",
                user_message.trim()
            )),
        ]);

        let decision = match self.model.complete(request).await {
            Ok(response) => WriteDecision::from_reply(&response.content),
            Err(e) => {
                warn!(error = %e, "memory judgment call failed");
                WriteDecision::declined("llm_failure")
            }
        };
        debug!(
            should_write = decision.should_write,
            reason = %decision.reason,
            "memory write judgment"
        );
        metrics::record_write_decision(decision.should_write);
        decision
    }
}
