//! LLM and embedding service seams.
//!
//! The graph only talks to [`ChatModel`] and [`Embedder`]. Production code
//! plugs in rig-core providers through [`providers`]; tests use the
//! deterministic doubles in [`scripted`].
//!
//! # Example
//! ```no_run
//! use supervisor_rs::llm::providers::{RigChatModel, openai_client};
//! use secrecy::SecretString;
//! use rig::client::CompletionClient;
//!
//! let key = SecretString::from("sk-...");
//! let client = openai_client(&key, None).expect("failed to create OpenAI client");
//! let model = RigChatModel::new(client.completion_model("gpt-4o-mini"), "gpt-4o-mini", "openai");
//! ```

pub mod providers;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::model::{Message, ToolCall};

/// Callable schema advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub temperature: Option<f64>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The model's reply: prose, tool-invocation requests, or both.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Convert to an assistant message authored by `name`.
    pub fn into_message(self, name: &str) -> Message {
        Message::assistant_with_tool_calls(self.content, self.tool_calls).with_name(name)
    }
}

/// Black-box text-completion service with tool calling.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse>;
}

/// Black-box vector-producing service.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
