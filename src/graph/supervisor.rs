//! The supervisor decision node.
//!
//! Runs the supervisor's tool loop (handoff tools plus memory tools) and
//! reduces its outcome to a [`Decision`]. The executor acts on the decision
//! only; nothing the model emits runs a code path directly.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::persist::SUPERVISOR;
use crate::agent::{AgentOutcome, ToolLoopAgent};
use crate::error::Result;
use crate::model::{ConversationState, Message, StateUpdate};
use crate::tools::HandoffPayload;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    Handoff {
        target: String,
        payload: HandoffPayload,
    },
    Answer {
        text: String,
    },
}

/// A decision plus the messages the supervisor produced reaching it.
#[derive(Debug, Clone)]
pub struct SupervisorTurn {
    pub update: StateUpdate,
    pub decision: Decision,
}

pub struct SupervisorNode {
    agent: ToolLoopAgent,
}

impl SupervisorNode {
    /// `agent` should be named [`SUPERVISOR`] so the persist step recognises
    /// its answers.
    pub fn new(agent: ToolLoopAgent) -> Self {
        if agent.name() != SUPERVISOR {
            warn!(name = agent.name(), "supervisor agent is not named {SUPERVISOR}; answers will not be persisted");
        }
        Self { agent }
    }

    pub fn agent(&self) -> &ToolLoopAgent {
        &self.agent
    }

    pub async fn decide(&self, state: &ConversationState) -> Result<SupervisorTurn> {
        let run = self.agent.run(state).await?;
        let mut update = run.update;
        let decision = match run.outcome {
            AgentOutcome::Handoff(handoff) => Decision::Handoff {
                target: handoff.target,
                payload: handoff.payload,
            },
            AgentOutcome::Finished => Decision::Answer {
                text: update
                    .messages
                    .last()
                    .map(Message::text)
                    .unwrap_or_default(),
            },
            AgentOutcome::IterationLimit => {
                // End the turn with an empty answer rather than stalling.
                update.push_message(Message::assistant("").with_name(self.agent.name()));
                Decision::Answer {
                    text: String::new(),
                }
            }
        };
        Ok(SupervisorTurn { update, decision })
    }
}
