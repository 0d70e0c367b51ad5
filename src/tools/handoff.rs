//! Handoff tools: the supervisor's way of transferring control to a worker.
//!
//! Calling one never runs the worker. It returns a [`Handoff`] that the
//! graph executor validates and dispatches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Tool, ToolOutput, parse_args};
use crate::error::{Error, Result};
use crate::model::{ConversationState, Message};

/// Tool name for handing off to `worker`.
pub fn handoff_tool_name(worker: &str) -> String {
    format!("transfer_to_{worker}")
}

/// Structured input for map-reduce style workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskPayload {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Community level for graph queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffPayload {
    /// Free-text task description.
    Message(String),
    Task(TaskPayload),
}

impl HandoffPayload {
    pub fn task_text(&self) -> &str {
        match self {
            HandoffPayload::Message(task) => task,
            HandoffPayload::Task(payload) => &payload.task,
        }
    }
}

/// A control-transfer instruction produced by a handoff tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    pub target: String,
    pub payload: HandoffPayload,
}

impl Handoff {
    /// The worker's input state: the parent's state with its history
    /// replaced by one user message carrying the task.
    pub fn seed_state(&self, parent: &ConversationState) -> ConversationState {
        ConversationState {
            messages: vec![Message::user(self.payload.task_text())],
            ..parent.clone()
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct HandoffArgs {
    task_description: String,
}

/// `transfer_to_<worker>`: hands the worker a single task message.
pub struct HandoffTool {
    worker: String,
    name: String,
    description: String,
}

impl HandoffTool {
    pub fn new(worker: impl Into<String>, description: Option<&str>) -> Self {
        let worker = worker.into();
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Ask {worker} for help."));
        Self {
            name: handoff_tool_name(&worker),
            worker,
            description,
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }
}

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_description": {
                    "type": "string",
                    "description": "What the next agent should do, including all relevant context."
                }
            },
            "required": ["task_description"]
        })
    }

    async fn call(&self, args: Value, _state: &ConversationState) -> Result<ToolOutput> {
        let args: HandoffArgs = parse_args(&self.name, args)?;
        if args.task_description.trim().is_empty() {
            return Err(Error::InvalidHandoff(format!(
                "{}: task_description is empty",
                self.name
            )));
        }
        Ok(ToolOutput::Handoff(Handoff {
            target: self.worker.clone(),
            payload: HandoffPayload::Message(args.task_description),
        }))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskArgs {
    task: String,
    #[serde(default)]
    level: Option<u32>,
}

/// `transfer_to_<worker>` variant that carries a [`TaskPayload`] assembled
/// from the model's arguments and the caller's state.
pub struct TaskHandoffTool {
    inner: HandoffTool,
}

impl TaskHandoffTool {
    pub fn new(worker: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            inner: HandoffTool::new(worker, description),
        }
    }

    pub fn worker(&self) -> &str {
        self.inner.worker()
    }
}

#[async_trait]
impl Tool for TaskHandoffTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The question or task for the worker."
                },
                "level": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Community level to query."
                }
            },
            "required": ["task"]
        })
    }

    async fn call(&self, args: Value, state: &ConversationState) -> Result<ToolOutput> {
        let args: TaskArgs = parse_args(self.name(), args)?;
        if args.task.trim().is_empty() {
            return Err(Error::InvalidHandoff(format!("{}: task is empty", self.name())));
        }
        let payload = TaskPayload {
            task: args.task,
            dataset_path: state.dataset.as_ref().map(|d| d.path.clone()),
            user_id: state.user_id.clone(),
            level: args.level,
        };
        Ok(ToolOutput::Handoff(Handoff {
            target: self.worker().to_string(),
            payload: HandoffPayload::Task(payload),
        }))
    }
}
