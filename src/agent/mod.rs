//! Bounded tool-calling loop shared by the supervisor and the workers.
//!
//! Each iteration asks the model for a reply, appends it, executes the
//! requested tools in order and appends their results. The loop ends on a
//! reply without tool calls, on the first handoff, or at the iteration cap.
//! Tool calls of one reply run sequentially; a turn never has two tools in
//! flight.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::llm::{ChatModel, ChatRequest};
use crate::model::{ConversationState, Message, StateUpdate, ToolCall};
use crate::tools::{Handoff, ToolOutput, ToolRegistry};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// How the loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutcome {
    /// The model replied without requesting tools.
    Finished,
    /// A handoff tool was called; the remaining calls of that reply were skipped.
    Handoff(Handoff),
    /// `max_iterations` model calls were made without a final reply.
    IterationLimit,
}

/// Messages and state changes produced by one run, plus how it ended.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub update: StateUpdate,
    pub outcome: AgentOutcome,
    pub iterations: usize,
}

impl AgentRun {
    /// Text of the last message the agent authored, if it finished.
    pub fn answer(&self) -> Option<String> {
        match self.outcome {
            AgentOutcome::Finished => self
                .update
                .messages
                .iter()
                .rev()
                .find(|m| m.is_final_answer())
                .map(Message::text),
            _ => None,
        }
    }
}

pub struct ToolLoopAgent {
    name: String,
    preamble: Option<String>,
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    max_iterations: usize,
    temperature: Option<f64>,
}

impl ToolLoopAgent {
    pub fn new(name: impl Into<String>, model: Arc<dyn ChatModel>, tools: ToolRegistry) -> Self {
        Self {
            name: name.into(),
            preamble: None,
            model,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            temperature: None,
        }
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the loop over `state`. Only model call failures are returned as
    /// `Err`; tool failures reach the model as `status = "error"` results.
    pub async fn run(&self, state: &ConversationState) -> Result<AgentRun> {
        let mut working = state.clone();
        let mut update = StateUpdate::none();

        for iteration in 1..=self.max_iterations {
            let mut request =
                ChatRequest::new(self.request_messages(&working)).with_tools(self.tools.schemas());
            if let Some(temperature) = self.temperature {
                request = request.with_temperature(temperature);
            }

            let response = self.model.complete(request).await?;
            let calls = response.tool_calls.clone();
            let reply = response.into_message(&self.name);
            working.messages.push(reply.clone());
            update.push_message(reply);

            if calls.is_empty() {
                debug!(agent = %self.name, iteration, "agent finished");
                return Ok(AgentRun {
                    update,
                    outcome: AgentOutcome::Finished,
                    iterations: iteration,
                });
            }

            if let Some(handoff) = self.execute_calls(&calls, &mut working, &mut update).await {
                info!(agent = %self.name, target = %handoff.target, "handing off");
                return Ok(AgentRun {
                    update,
                    outcome: AgentOutcome::Handoff(handoff),
                    iterations: iteration,
                });
            }
        }

        warn!(agent = %self.name, max_iterations = self.max_iterations, "agent hit iteration limit");
        Ok(AgentRun {
            update,
            outcome: AgentOutcome::IterationLimit,
            iterations: self.max_iterations,
        })
    }

    fn request_messages(&self, state: &ConversationState) -> Vec<Message> {
        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        if let Some(preamble) = &self.preamble {
            messages.push(Message::system(preamble.as_str()));
        }
        messages.extend(state.messages.iter().cloned());
        messages
    }

    /// Execute one reply's tool calls. Returns the first handoff, after
    /// answering every call so the history stays well formed.
    async fn execute_calls(
        &self,
        calls: &[ToolCall],
        working: &mut ConversationState,
        update: &mut StateUpdate,
    ) -> Option<Handoff> {
        let mut handoff: Option<Handoff> = None;

        for call in calls {
            let content = if let Some(taken) = &handoff {
                json!({
                    "status": "error",
                    "message": format!("skipped: control was already transferred to {}", taken.target),
                })
            } else {
                debug!(agent = %self.name, tool = %call.name, "calling tool");
                match self.tools.invoke(&call.name, call.arguments.clone(), working).await {
                    ToolOutput::Value(value) => value,
                    ToolOutput::Update { content, update: patch } => {
                        working.apply(patch.clone());
                        update.merge(patch);
                        content
                    }
                    ToolOutput::Handoff(h) => {
                        let content = json!({
                            "status": "success",
                            "message": format!("Successfully transferred to {}", h.target),
                        });
                        handoff = Some(h);
                        content
                    }
                }
            };

            let result = Message::tool_result(call.id.clone(), render(&content)).with_name(call.name.clone());
            working.messages.push(result.clone());
            update.push_message(result);
        }

        handoff
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
