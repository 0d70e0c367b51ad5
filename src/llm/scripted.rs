//! Deterministic LLM and embedding doubles.
//!
//! [`ScriptedChatModel`] replays a fixed list of replies and records every
//! request it receives, so tests can assert how many model calls a node
//! made. [`StaticEmbedder`] maps known texts to fixed vectors and fails for
//! anything else, which exercises the lexical fallback path.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{ChatModel, ChatRequest, ChatResponse, Embedder};
use crate::error::{Error, Result};
use crate::model::ToolCall;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Plain assistant text.
    Text(String),
    /// Assistant turn requesting tools, with optional accompanying text.
    ToolCalls {
        content: String,
        calls: Vec<ToolCall>,
    },
    /// The call fails.
    Error(String),
}

impl ScriptStep {
    pub fn text(content: impl Into<String>) -> Self {
        ScriptStep::Text(content.into())
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        ScriptStep::ToolCalls {
            content: String::new(),
            calls: vec![ToolCall::new(id, name, arguments)],
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        ScriptStep::ToolCalls {
            content: String::new(),
            calls,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ScriptStep::Error(message.into())
    }
}

/// A chat model driven by scripted steps. Cloning shares the script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChatModel {
    model: String,
    script: Arc<Mutex<VecDeque<ScriptStep>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedChatModel {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            model: "scripted".to_string(),
            script: Arc::new(Mutex::new(steps.into_iter().collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn push(&self, step: ScriptStep) {
        self.script.lock().push_back(step);
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().push(request);
        let step = self.script.lock().pop_front();
        match step {
            Some(ScriptStep::Text(content)) => Ok(ChatResponse::text(content)),
            Some(ScriptStep::ToolCalls { content, calls }) => Ok(ChatResponse {
                content,
                tool_calls: calls,
                usage: None,
            }),
            Some(ScriptStep::Error(message)) => Err(Error::Llm(message)),
            None => Err(Error::Llm("script exhausted".to_string())),
        }
    }
}

/// An embedder with a fixed text-to-vector table.
#[derive(Debug, Clone, Default)]
pub struct StaticEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    calls: Arc<Mutex<usize>>,
}

impl StaticEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    fn model(&self) -> &str {
        "static"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        *self.calls.lock() += 1;
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| Error::Embedding(format!("no vector for {text:?}")))
    }
}
