//! Workers: the specialized agents the supervisor hands tasks to.
//!
//! To the graph a worker is an opaque state transformer. It receives the
//! seeded input state and the handoff payload, and returns the update to
//! merge into the parent conversation.

pub mod map_reduce;
pub mod registry;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::agent::{AgentOutcome, ToolLoopAgent};
use crate::error::{Error, Result};
use crate::llm::ChatModel;
use crate::model::{ConversationState, StateUpdate};
use crate::tools::{HandoffPayload, HandoffTool, TaskHandoffTool, Tool, ToolRegistry};

pub use map_reduce::{Community, CommunitySource, MapReduceSearch, MapTask};
pub use registry::{PayloadKind, WorkerRegistry, WorkerSpec};

/// Input to a worker run.
#[derive(Debug, Clone)]
pub struct WorkerInput {
    /// The parent's state with its history replaced by the task message.
    pub state: ConversationState,
    pub payload: HandoffPayload,
}

#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Which handoff variant the supervisor should use for this worker.
    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Message
    }

    /// Run the worker. The returned update is appended to the parent state,
    /// seeded task message included.
    async fn run(&self, input: WorkerInput) -> Result<StateUpdate>;
}

/// The supervisor-side handoff tool for `worker`.
pub fn handoff_tool_for(worker: &dyn Worker) -> Arc<dyn Tool> {
    match worker.payload_kind() {
        PayloadKind::Message => Arc::new(HandoffTool::new(worker.name(), Some(worker.description()))),
        PayloadKind::Task => {
            Arc::new(TaskHandoffTool::new(worker.name(), Some(worker.description())))
        }
    }
}

/// A worker backed by a bounded tool-calling agent.
pub struct AgentWorker {
    spec: WorkerSpec,
    description: String,
    agent: ToolLoopAgent,
}

impl AgentWorker {
    pub fn new(spec: WorkerSpec, model: Arc<dyn ChatModel>, tools: ToolRegistry) -> Self {
        let description = spec
            .description
            .clone()
            .unwrap_or_else(|| format!("Assign task to {}.", spec.name));
        let agent = ToolLoopAgent::new(spec.name.clone(), model, tools)
            .with_preamble(spec.preamble.clone())
            .with_max_iterations(spec.max_iterations)
            .with_temperature(spec.temperature);
        Self {
            spec,
            description,
            agent,
        }
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }
}

#[async_trait]
impl Worker for AgentWorker {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn payload_kind(&self) -> PayloadKind {
        self.spec.payload
    }

    async fn run(&self, input: WorkerInput) -> Result<StateUpdate> {
        let run = self.agent.run(&input.state).await?;
        match run.outcome {
            AgentOutcome::Finished => {}
            AgentOutcome::IterationLimit => {
                warn!(worker = %self.spec.name, "worker stopped at iteration limit");
            }
            AgentOutcome::Handoff(handoff) => {
                return Err(Error::InvalidHandoff(format!(
                    "worker {} tried to hand off to {}",
                    self.spec.name, handoff.target
                )));
            }
        }

        let mut update = StateUpdate::none().with_messages(input.state.messages);
        update.merge(run.update);
        Ok(update)
    }
}
