//! Memory tools for agents.
//!
//! Every tool resolves its namespace from the injected caller state unless
//! the model passes an explicit `namespace`, and echoes the namespace it
//! used back in the result.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Tool, ToolOutput, ToolResult, parse_args};
use crate::error::Result;
use crate::memory::{DEFAULT_MIN_SCORE, DEFAULT_TOP_K, MemoryBackend, Namespaces};
use crate::model::{ConversationState, Metadata, WriteStatus};

const WRITE_INTENT: &[&str] = &[
    "记住",
    "默认",
    "以后都",
    "偏好",
    "习惯",
    "remember",
    "from now on",
    "i prefer",
];

const READ_INTENT: &[&str] = &[
    "以前",
    "之前",
    "上次",
    "你知道我",
    "我的偏好",
    "last time",
    "previously",
    "do you remember",
];

const SUMMARY_ITEM_LIMIT: usize = 10;
const DEFAULT_SUMMARY_GOAL: &str = "summarize context";

/// Keyword pre-check of whether a message asks to recall or to remember.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteIntent {
    pub should_read: bool,
    pub should_write: bool,
}

pub fn route_intent(message: &str) -> RouteIntent {
    let text = message.to_lowercase();
    RouteIntent {
        should_read: READ_INTENT.iter().any(|k| text.contains(k)),
        should_write: WRITE_INTENT.iter().any(|k| text.contains(k)),
    }
}

/// `"{goal}:\n- a\n- b"` over the first ten items.
pub fn summarize_items<S: AsRef<str>>(items: &[S], goal: &str) -> String {
    let mut summary = format!("{goal}:");
    for item in items.iter().take(SUMMARY_ITEM_LIMIT) {
        summary.push_str("\n- ");
        summary.push_str(item.as_ref());
    }
    summary
}

struct MemoryToolContext {
    backend: Arc<dyn MemoryBackend>,
    namespaces: Namespaces,
}

impl MemoryToolContext {
    fn namespace(&self, state: &ConversationState, explicit: Option<&str>) -> String {
        self.namespaces.resolve(state, explicit)
    }
}

/// The six memory tools sharing one backend.
pub fn memory_tools(backend: Arc<dyn MemoryBackend>, namespaces: Namespaces) -> Vec<Arc<dyn Tool>> {
    let ctx = Arc::new(MemoryToolContext {
        backend,
        namespaces,
    });
    vec![
        Arc::new(MemorySearch(Arc::clone(&ctx))),
        Arc::new(MemoryWrite(Arc::clone(&ctx))),
        Arc::new(MemoryUpdate(Arc::clone(&ctx))),
        Arc::new(MemoryDelete(Arc::clone(&ctx))),
        Arc::new(MemoryRoute(ctx)),
        Arc::new(MemorySummarize),
    ]
}

fn namespace_property() -> Value {
    json!({
        "type": "string",
        "description": "Override the namespace. Defaults to the current user's."
    })
}

struct MemorySearch(Arc<MemoryToolContext>);

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    min_score: Option<f32>,
    #[serde(default)]
    namespace: Option<String>,
}

#[async_trait]
impl Tool for MemorySearch {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search memory items by semantic similarity within a namespace."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "top_k": { "type": "integer", "minimum": 1, "default": DEFAULT_TOP_K },
                "min_score": { "type": "number", "default": DEFAULT_MIN_SCORE },
                "namespace": namespace_property()
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: Value, state: &ConversationState) -> Result<ToolOutput> {
        let args: SearchArgs = parse_args(self.name(), args)?;
        let ns = self.0.namespace(state, args.namespace.as_deref());
        let results = self
            .0
            .backend
            .search(
                &ns,
                &args.query,
                args.top_k.unwrap_or(DEFAULT_TOP_K),
                args.min_score.unwrap_or(DEFAULT_MIN_SCORE),
            )
            .await?;
        Ok(ToolResult::success(format!("found {} memories", results.len()))
            .with("namespace", &ns)
            .with("results", &results)
            .into())
    }
}

struct MemoryWrite(Arc<MemoryToolContext>);

#[derive(Deserialize)]
struct WriteArgs {
    content: String,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    namespace: Option<String>,
}

#[async_trait]
impl Tool for MemoryWrite {
    fn name(&self) -> &str {
        "memory_write"
    }

    fn description(&self) -> &str {
        "Write a new memory item with optional metadata into a namespace."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" },
                "metadata": { "type": "object" },
                "namespace": namespace_property()
            },
            "required": ["content"]
        })
    }

    async fn call(&self, args: Value, state: &ConversationState) -> Result<ToolOutput> {
        let args: WriteArgs = parse_args(self.name(), args)?;
        if args.content.trim().is_empty() {
            return Ok(ToolResult::error("content is empty").into());
        }
        let ns = self.0.namespace(state, args.namespace.as_deref());
        let receipt = self
            .0
            .backend
            .write(&ns, &args.content, args.metadata.unwrap_or_default())
            .await?;
        Ok(ToolResult::success("memory written")
            .with("namespace", &ns)
            .with("id", &receipt.id)
            .into())
    }
}

struct MemoryUpdate(Arc<MemoryToolContext>);

#[derive(Deserialize)]
struct UpdateArgs {
    item_id: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    namespace: Option<String>,
}

#[async_trait]
impl Tool for MemoryUpdate {
    fn name(&self) -> &str {
        "memory_update"
    }

    fn description(&self) -> &str {
        "Update a memory item's content and/or metadata by id within a namespace."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "item_id": { "type": "string" },
                "content": { "type": "string" },
                "metadata": { "type": "object" },
                "namespace": namespace_property()
            },
            "required": ["item_id"]
        })
    }

    async fn call(&self, args: Value, state: &ConversationState) -> Result<ToolOutput> {
        let args: UpdateArgs = parse_args(self.name(), args)?;
        let ns = self.0.namespace(state, args.namespace.as_deref());
        let receipt = self
            .0
            .backend
            .update(&ns, &args.item_id, args.content.as_deref(), args.metadata)
            .await?;
        let result = match receipt.status {
            WriteStatus::Ok => ToolResult::success("memory updated"),
            WriteStatus::NotFound => {
                ToolResult::error(format!("memory {} not found in {ns}", receipt.id))
            }
        };
        Ok(result
            .with("namespace", &ns)
            .with("id", &receipt.id)
            .with("result", receipt.status)
            .into())
    }
}

struct MemoryDelete(Arc<MemoryToolContext>);

#[derive(Deserialize)]
struct DeleteArgs {
    #[serde(default)]
    item_id: Option<String>,
    #[serde(default)]
    filters: Option<Metadata>,
    #[serde(default)]
    namespace: Option<String>,
}

#[async_trait]
impl Tool for MemoryDelete {
    fn name(&self) -> &str {
        "memory_delete"
    }

    fn description(&self) -> &str {
        "Delete a memory item by id or by metadata filters within a namespace. \
         With neither, deletes everything in the namespace."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "item_id": { "type": "string" },
                "filters": { "type": "object" },
                "namespace": namespace_property()
            }
        })
    }

    async fn call(&self, args: Value, state: &ConversationState) -> Result<ToolOutput> {
        let args: DeleteArgs = parse_args(self.name(), args)?;
        let ns = self.0.namespace(state, args.namespace.as_deref());
        let receipt = self
            .0
            .backend
            .delete(&ns, args.item_id.as_deref(), args.filters.as_ref())
            .await?;
        Ok(ToolResult::success(format!("deleted {} memories", receipt.deleted))
            .with("namespace", &ns)
            .with("deleted", receipt.deleted)
            .into())
    }
}

struct MemoryRoute(Arc<MemoryToolContext>);

#[derive(Deserialize)]
struct RouteArgs {
    message: String,
}

#[async_trait]
impl Tool for MemoryRoute {
    fn name(&self) -> &str {
        "memory_route"
    }

    fn description(&self) -> &str {
        "Heuristically decide whether to read or write memory based on the message."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"]
        })
    }

    async fn call(&self, args: Value, state: &ConversationState) -> Result<ToolOutput> {
        let args: RouteArgs = parse_args(self.name(), args)?;
        let intent = route_intent(&args.message);
        Ok(ToolResult::success("routed")
            .with("should_read", intent.should_read)
            .with("should_write", intent.should_write)
            .with("namespaces", [self.0.namespace(state, None)])
            .into())
    }
}

struct MemorySummarize;

#[derive(Deserialize)]
struct SummarizeArgs {
    items: Vec<String>,
    #[serde(default)]
    goal: Option<String>,
}

#[async_trait]
impl Tool for MemorySummarize {
    fn name(&self) -> &str {
        "memory_summarize"
    }

    fn description(&self) -> &str {
        "Create a short bullet-list summary for given items aligned to a goal."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "items": { "type": "array", "items": { "type": "string" } },
                "goal": { "type": "string", "default": DEFAULT_SUMMARY_GOAL }
            },
            "required": ["items"]
        })
    }

    async fn call(&self, args: Value, _state: &ConversationState) -> Result<ToolOutput> {
        let args: SummarizeArgs = parse_args(self.name(), args)?;
        let goal = args.goal.as_deref().unwrap_or(DEFAULT_SUMMARY_GOAL);
        Ok(ToolResult::success("summarized")
            .with("summary", summarize_items(&args.items, goal))
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_intent_detects_write_and_read_keywords() {
        assert_eq!(
            route_intent("请记住我喜欢简洁的回答"),
            RouteIntent {
                should_read: false,
                should_write: true
            }
        );
        assert!(route_intent("Do you remember what I said last time?").should_read);
        assert!(route_intent("From now on, answer in English").should_write);
        assert_eq!(route_intent("1+2是多少"), RouteIntent::default());
    }

    #[test]
    fn summarize_caps_items() {
        let items: Vec<String> = (0..12).map(|i| format!("item {i}")).collect();
        let summary = summarize_items(&items, "goal");
        assert!(summary.starts_with("goal:\n- item 0\n- item 1"));
        assert!(summary.ends_with("- item 9"));
        assert_eq!(summary.lines().count(), 11);
    }
}
