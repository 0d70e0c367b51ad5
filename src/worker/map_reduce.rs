//! Map-reduce search over graph communities.
//!
//! Three stages: fetch the community reports for a level, summarize each
//! one against the question (map), then synthesize a single answer from all
//! the partial answers (reduce). Map tasks live in an arena indexed by
//! position; the map stage runs them with bounded concurrency and writes
//! each result back into its own slot, so the reduce stage always sees the
//! reports in community order.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{PayloadKind, Worker, WorkerInput};
use crate::error::{Error, Result};
use crate::llm::{ChatModel, ChatRequest};
use crate::model::{Message, StateUpdate};
use crate::tools::HandoffPayload;

pub const NO_DATA_ANSWER: &str = "No community reports are available at this level.";

const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_LEVEL: u32 = 0;
const DEFAULT_TEMPERATURE: f64 = 0.3;
const DEFAULT_RESPONSE_TYPE: &str = "multiple paragraphs";

const MAP_PREAMBLE: &str = "You answer the user's question using only the data table \
provided. List the key points relevant to the question with an importance score. \
If the table holds nothing relevant, say so.";

const REDUCE_PREAMBLE: &str = "You synthesize analyst reports into one answer. \
Merge overlapping points, drop irrelevant ones and do not invent facts that no \
report supports.";

/// One community report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: String,
    pub content: String,
}

/// Black-box graph query returning the community reports at one level.
#[async_trait]
pub trait CommunitySource: Send + Sync {
    async fn fetch(&self, level: u32) -> Result<Vec<Community>>;
}

/// Arena slot for one map task.
#[derive(Debug, Clone)]
pub struct MapTask {
    pub index: usize,
    pub community: Community,
    /// `None` until the map stage has run; errors are kept as text.
    pub result: Option<std::result::Result<String, String>>,
}

impl MapTask {
    pub fn output(&self) -> Option<&str> {
        match &self.result {
            Some(Ok(text)) => Some(text),
            _ => None,
        }
    }
}

pub struct MapReduceSearch {
    name: String,
    description: String,
    model: Arc<dyn ChatModel>,
    source: Arc<dyn CommunitySource>,
    concurrency: usize,
    default_level: u32,
    temperature: f64,
    response_type: String,
}

impl MapReduceSearch {
    pub fn new(
        name: impl Into<String>,
        model: Arc<dyn ChatModel>,
        source: Arc<dyn CommunitySource>,
    ) -> Self {
        let name = name.into();
        Self {
            description: format!("Assign a global, report-level question to {name}."),
            name,
            model,
            source,
            concurrency: DEFAULT_CONCURRENCY,
            default_level: DEFAULT_LEVEL,
            temperature: DEFAULT_TEMPERATURE,
            response_type: DEFAULT_RESPONSE_TYPE.to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_default_level(mut self, level: u32) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_response_type(mut self, response_type: impl Into<String>) -> Self {
        self.response_type = response_type.into();
        self
    }

    /// Answer `query` from the communities at `level`.
    pub async fn search(&self, query: &str, level: u32) -> Result<String> {
        let communities = self.source.fetch(level).await?;
        if communities.is_empty() {
            info!(worker = %self.name, level, "no communities, skipping map-reduce");
            return Ok(NO_DATA_ANSWER.to_string());
        }

        let mut tasks = plan(communities);
        self.map(query, &mut tasks).await;
        self.reduce(query, &tasks).await
    }

    async fn map(&self, query: &str, tasks: &mut [MapTask]) {
        let pending: Vec<_> = tasks
            .iter()
            .map(|task| self.map_one(query, task.community.clone()))
            .collect();
        let results: Vec<Result<String>> = futures::stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await;

        for (task, result) in tasks.iter_mut().zip(results) {
            if let Err(e) = &result {
                warn!(worker = %self.name, community = %task.community.id, error = %e, "map task failed");
            }
            task.result = Some(result.map_err(|e| e.to_string()));
        }
    }

    async fn map_one(&self, query: &str, community: Community) -> Result<String> {
        debug!(worker = %self.name, community = %community.id, "mapping community");
        let request = ChatRequest::new(vec![
            Message::system(MAP_PREAMBLE),
            Message::user(format!(
                "---Data table---\n{}\nThe user's question is: {query}",
                community.content
            )),
        ])
        .with_temperature(self.temperature);
        Ok(self.model.complete(request).await?.content)
    }

    async fn reduce(&self, query: &str, tasks: &[MapTask]) -> Result<String> {
        let reports: Vec<&str> = tasks.iter().filter_map(MapTask::output).collect();
        if reports.is_empty() {
            return Err(Error::Llm(format!(
                "{}: all {} map tasks failed",
                self.name,
                tasks.len()
            )));
        }

        let request = ChatRequest::new(vec![
            Message::system(REDUCE_PREAMBLE),
            Message::user(format!(
                "---Analysis reports---\n{}\n\nThe user's question is:\n{query}\n\n\
                 Respond in the form of {}.",
                reports.join("\n\n"),
                self.response_type
            )),
        ])
        .with_temperature(self.temperature);
        Ok(self.model.complete(request).await?.content)
    }
}

/// Lay out one arena slot per community, in fetch order.
pub fn plan(communities: Vec<Community>) -> Vec<MapTask> {
    communities
        .into_iter()
        .enumerate()
        .map(|(index, community)| MapTask {
            index,
            community,
            result: None,
        })
        .collect()
}

#[async_trait]
impl Worker for MapReduceSearch {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Task
    }

    async fn run(&self, input: WorkerInput) -> Result<StateUpdate> {
        let level = match &input.payload {
            HandoffPayload::Task(payload) => payload.level.unwrap_or(self.default_level),
            HandoffPayload::Message(_) => self.default_level,
        };
        let answer = self.search(input.payload.task_text(), level).await?;
        Ok(StateUpdate::none()
            .with_messages(input.state.messages)
            .with_messages([Message::assistant(answer).with_name(self.name.as_str())]))
    }
}
