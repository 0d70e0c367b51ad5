//! Callable tools exposed to agents.
//!
//! A [`Tool`] receives model-authored JSON arguments plus the caller's
//! [`ConversationState`] (injected, never shown to the model) and returns a
//! [`ToolOutput`]: plain result data, data plus a state update, or a
//! [`Handoff`] that transfers control to a worker.
//!
//! Failures the model can act on travel back as [`ToolResult`] data with
//! `status = "error"`; see [`ToolRegistry::invoke`].

pub mod handoff;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::llm::ToolSchema;
use crate::model::{ConversationState, StateUpdate};

pub use handoff::{Handoff, HandoffPayload, HandoffTool, TaskHandoffTool, TaskPayload, handoff_tool_name};
pub use memory::memory_tools;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn parameters(&self) -> Value;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    async fn call(&self, args: Value, state: &ConversationState) -> Result<ToolOutput>;
}

/// What a tool invocation produced.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    /// Result data, serialized into the tool-result message.
    Value(Value),
    /// Result data plus a partial update to the caller's state.
    Update { content: Value, update: StateUpdate },
    /// Transfer control to a worker.
    Handoff(Handoff),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
}

/// The status/message result contract shared by all tools.
///
/// Callers must check `status` before trusting any other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub message: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.data.insert(key.to_string(), value);
            }
            Err(e) => warn!(key, error = %e, "dropping unserializable tool result field"),
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    pub fn into_value(self) -> Value {
        let mut map = self.data;
        map.insert("status".to_string(), serde_json::json!(self.status));
        map.insert("message".to_string(), Value::String(self.message));
        Value::Object(map)
    }
}

impl From<ToolResult> for ToolOutput {
    fn from(result: ToolResult) -> Self {
        ToolOutput::Value(result.into_value())
    }
}

/// Deserialize tool arguments, reporting failures against the tool's name.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    // Some models send `null` for tools without parameters.
    let args = if args.is_null() {
        Value::Object(Map::new())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| Error::InvalidToolArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Named tool set. Schemas are listed in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any earlier tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn extend(&mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.schema())
            .collect()
    }

    /// A registry holding only the named tools, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut selected = Self::new();
        for name in names {
            let tool = self
                .get(name.as_ref())
                .ok_or_else(|| Error::UnknownTool(name.as_ref().to_string()))?;
            selected.register(Arc::clone(tool));
        }
        Ok(selected)
    }

    /// Call a tool by name, turning every failure into `status = "error"` data.
    pub async fn invoke(&self, name: &str, args: Value, state: &ConversationState) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "model requested an unknown tool");
            return ToolResult::error(format!("unknown tool: {name}")).into();
        };
        match tool.call(args, state).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                ToolResult::error(e.to_string()).into()
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.order).finish()
    }
}
