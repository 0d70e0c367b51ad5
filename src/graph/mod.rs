//! The supervisor graph.
//!
//! ```text
//! start -> memory_router -> supervisor -+-> <worker> -> memory_router ...
//!                                       |
//!                                       +-> memory_persist -> end
//! ```
//!
//! Edges are fixed. The only model-controlled choice is the supervisor's
//! [`Decision`]: hand off to one worker, or answer. Nodes of a turn run one
//! at a time; independent turns may run concurrently on the same graph.

pub mod judgment;
pub mod persist;
pub mod router;
pub mod supervisor;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, info};
use uuid::Uuid;

use crate::agent::ToolLoopAgent;
use crate::config::Config;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::event::{Event, EventKind, EventLog};
use crate::llm::ChatModel;
use crate::llm::providers::{chat_model_from_config, embedder_from_config};
use crate::memory::{MemoryBackend, Namespaces, select_backend};
use crate::model::ConversationState;
use crate::telemetry::metrics;
use crate::telemetry::turn::{record_node_transition, record_steps, start_turn_span};
use crate::tools::{Handoff, ToolRegistry, memory_tools};
use crate::worker::{Worker, WorkerInput, WorkerRegistry, handoff_tool_for};

pub use judgment::{WriteDecision, WriteJudge};
pub use persist::{MemoryPersist, PersistResult, SUPERVISOR};
pub use router::MemoryRouter;
pub use supervisor::{Decision, SupervisorNode, SupervisorTurn};

pub const DEFAULT_MAX_STEPS: usize = 25;

const SUPERVISOR_PREAMBLE: &str = "You are a supervisor managing specialized agents. \
Assign each task to the agent best suited for it by calling its transfer tool, one \
agent at a time, and never do their work yourself. Use the memory tools to recall or \
store user preferences. When the agents' results answer the user's request, reply \
with the final answer directly.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    MemoryRouter,
    Supervisor,
    Worker(String),
    MemoryPersist,
    End,
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::MemoryRouter => "memory_router",
            Node::Supervisor => "supervisor",
            Node::Worker(name) => name,
            Node::MemoryPersist => "memory_persist",
            Node::End => "end",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    pub state: ConversationState,
    /// Node names in execution order, `end` excluded.
    pub path: Vec<String>,
    pub events: Vec<Event>,
}

impl TurnOutcome {
    /// Text of the supervisor's final answer, empty if it gave none.
    pub fn answer(&self) -> String {
        self.state
            .last_final_answer()
            .map(|m| m.text())
            .unwrap_or_default()
    }
}

pub struct SupervisorGraph {
    router: MemoryRouter,
    supervisor: SupervisorNode,
    persist: MemoryPersist,
    workers: BTreeMap<String, Arc<dyn Worker>>,
    max_steps: usize,
    db: Option<Arc<Db>>,
}

impl SupervisorGraph {
    pub fn builder(model: Arc<dyn ChatModel>, backend: Arc<dyn MemoryBackend>) -> SupervisorGraphBuilder {
        SupervisorGraphBuilder::new(model, backend)
    }

    /// Wire everything from configuration: LLM and embedding clients,
    /// memory backend (with database when configured and reachable), and
    /// TOML-declared workers resolving their tools from `worker_tools`.
    pub async fn from_config(
        config: &Config,
        worker_tools: &ToolRegistry,
        extra_workers: Vec<Arc<dyn Worker>>,
    ) -> Result<Self> {
        let model = chat_model_from_config(config)?;
        let embedder = embedder_from_config(config)?;
        let db = Db::connect_configured(config).await.map(Arc::new);
        let backend = select_backend(db.clone(), embedder).await;

        let registry = if config.workers_dir.is_dir() {
            WorkerRegistry::load_from_dir(&config.workers_dir)?
        } else {
            info!(dir = %config.workers_dir.display(), "no worker directory, starting without declared workers");
            WorkerRegistry::empty()
        };

        let mut builder = Self::builder(Arc::clone(&model), backend)
            .namespaces(Namespaces::new(config.namespace_prefix.clone()))
            .temperature(config.temperature)
            .max_steps(config.max_graph_steps)
            .database(db);
        for worker in registry.build_all(model, worker_tools)? {
            builder = builder.worker(worker);
        }
        for worker in extra_workers {
            builder = builder.worker(worker);
        }
        builder.build()
    }

    pub fn worker_names(&self) -> impl Iterator<Item = &str> {
        self.workers.keys().map(String::as_str)
    }

    pub fn supervisor(&self) -> &SupervisorNode {
        &self.supervisor
    }

    /// Run one turn to completion.
    ///
    /// Errors only for a worker failure, a handoff to an unknown worker or
    /// the step limit. In those cases `memory_persist` never runs, so no
    /// memory is written.
    pub async fn run(&self, state: ConversationState) -> Result<TurnOutcome> {
        let turn_id = Uuid::new_v4();
        let span = start_turn_span(state.identity(), &turn_id);
        self.run_turn(turn_id, state, span.clone())
            .instrument(span)
            .await
    }

    async fn run_turn(
        &self,
        turn_id: Uuid,
        mut state: ConversationState,
        span: tracing::Span,
    ) -> Result<TurnOutcome> {
        let mut events = EventLog::new();
        let mut path = Vec::new();
        let mut pending: Option<Handoff> = None;
        let mut node = Node::MemoryRouter;
        let mut steps = 0;

        while node != Node::End {
            if steps >= self.max_steps {
                record_steps(&span, steps);
                return Err(Error::RecursionLimit(self.max_steps));
            }
            steps += 1;

            events.emit(EventKind::NodeEntered {
                node: node.name().to_string(),
            });
            metrics::record_node_visit(node.name());
            path.push(node.name().to_string());
            let started = Instant::now();

            let next = match &node {
                Node::MemoryRouter => {
                    let update = self.router.route(&state).await;
                    if let Some(Some(staged)) = &update.pending_memory_write {
                        events.emit(EventKind::MemoryWriteStaged {
                            namespace: staged.namespace.clone(),
                            summary: staged.summary.clone(),
                        });
                    }
                    state.apply(update);
                    Node::Supervisor
                }
                Node::Supervisor => {
                    let turn = self.supervisor.decide(&state).await?;
                    state.apply(turn.update);
                    match turn.decision {
                        Decision::Handoff { target, payload } => {
                            if !self.workers.contains_key(&target) {
                                return Err(Error::UnknownWorker(target));
                            }
                            events.emit(EventKind::Handoff {
                                from: SUPERVISOR.to_string(),
                                to: target.clone(),
                            });
                            metrics::record_handoff(&target);
                            pending = Some(Handoff {
                                target: target.clone(),
                                payload,
                            });
                            Node::Worker(target)
                        }
                        Decision::Answer { .. } => Node::MemoryPersist,
                    }
                }
                Node::Worker(name) => {
                    let handoff = pending
                        .take()
                        .ok_or_else(|| Error::InvalidHandoff(format!("{name} entered without a handoff")))?;
                    let worker = self
                        .workers
                        .get(name)
                        .ok_or_else(|| Error::UnknownWorker(name.clone()))?;
                    let input = WorkerInput {
                        state: handoff.seed_state(&state),
                        payload: handoff.payload,
                    };
                    let update = worker.run(input).await?;
                    state.apply(update);
                    Node::MemoryRouter
                }
                Node::MemoryPersist => {
                    let (update, result) = self.persist.persist(&state).await;
                    match result {
                        PersistResult::NothingStaged => {}
                        PersistResult::Committed { namespace, id } => {
                            events.emit(EventKind::MemoryWriteCommitted { namespace, id });
                        }
                        PersistResult::Skipped { namespace, reason } => {
                            events.emit(EventKind::MemoryWriteDropped { namespace, reason });
                        }
                        PersistResult::Failed { namespace, error } => {
                            events.emit(EventKind::MemoryWriteDropped {
                                namespace,
                                reason: error,
                            });
                        }
                    }
                    state.apply(update);
                    Node::End
                }
                Node::End => Node::End,
            };

            metrics::record_duration(node.name(), started);
            record_node_transition(&span, node.name(), next.name());
            node = next;
        }

        record_steps(&span, steps);
        events.emit(EventKind::TurnCompleted { steps });
        info!(turn = %turn_id, steps, "turn completed");
        Ok(TurnOutcome {
            turn_id,
            state,
            path,
            events: events.into_events(),
        })
    }

    /// Close the database pool, if the graph owns one.
    pub async fn shutdown(&self) {
        if let Some(db) = &self.db {
            db.close().await;
        }
    }
}

pub struct SupervisorGraphBuilder {
    model: Arc<dyn ChatModel>,
    judge_model: Option<Arc<dyn ChatModel>>,
    backend: Arc<dyn MemoryBackend>,
    namespaces: Namespaces,
    workers: Vec<Arc<dyn Worker>>,
    extra_tools: ToolRegistry,
    preamble: String,
    temperature: Option<f64>,
    max_iterations: usize,
    max_steps: usize,
    db: Option<Arc<Db>>,
}

impl SupervisorGraphBuilder {
    pub fn new(model: Arc<dyn ChatModel>, backend: Arc<dyn MemoryBackend>) -> Self {
        Self {
            model,
            judge_model: None,
            backend,
            namespaces: Namespaces::default(),
            workers: Vec::new(),
            extra_tools: ToolRegistry::new(),
            preamble: SUPERVISOR_PREAMBLE.to_string(),
            temperature: None,
            max_iterations: crate::agent::DEFAULT_MAX_ITERATIONS,
            max_steps: DEFAULT_MAX_STEPS,
            db: None,
        }
    }

    /// Use a different model for the write-worthiness judgment.
    pub fn judge_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.judge_model = Some(model);
        self
    }

    pub fn namespaces(mut self, namespaces: Namespaces) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.workers.push(worker);
        self
    }

    /// Additional tools for the supervisor besides handoffs and memory tools.
    pub fn tool(mut self, tool: Arc<dyn crate::tools::Tool>) -> Self {
        self.extra_tools.register(tool);
        self
    }

    pub fn preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Hand the graph the pool so [`SupervisorGraph::shutdown`] can close it.
    pub fn database(mut self, db: Option<Arc<Db>>) -> Self {
        self.db = db;
        self
    }

    pub fn build(self) -> Result<SupervisorGraph> {
        let mut workers = BTreeMap::new();
        let mut tools = ToolRegistry::new();
        for worker in self.workers {
            let name = worker.name().to_string();
            if name == SUPERVISOR || name == "memory_router" || name == "memory_persist" {
                return Err(Error::Config(format!("worker name {name} is reserved")));
            }
            tools.register(handoff_tool_for(worker.as_ref()));
            if workers.insert(name.clone(), worker).is_some() {
                return Err(Error::Config(format!("duplicate worker: {name}")));
            }
        }
        tools.extend(memory_tools(Arc::clone(&self.backend), self.namespaces.clone()));
        for name in self.extra_tools.names() {
            if let Some(tool) = self.extra_tools.get(name) {
                tools.register(Arc::clone(tool));
            }
        }

        let agent = ToolLoopAgent::new(SUPERVISOR, Arc::clone(&self.model), tools)
            .with_preamble(self.preamble)
            .with_max_iterations(self.max_iterations)
            .with_temperature(self.temperature);
        let judge = WriteJudge::new(self.judge_model.unwrap_or(self.model));

        Ok(SupervisorGraph {
            router: MemoryRouter::new(Arc::clone(&self.backend), self.namespaces, judge),
            supervisor: SupervisorNode::new(agent),
            persist: MemoryPersist::new(self.backend),
            workers,
            max_steps: self.max_steps.max(1),
            db: self.db,
        })
    }
}
