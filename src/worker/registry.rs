//! Worker definitions and registry.
//!
//! Each worker is declared in its own TOML file:
//!
//! ```toml
//! [worker]
//! name = "text2sql_agent"
//! description = "Assign task to a text2sql agent."
//! preamble = "You translate questions into SQL ..."
//! tools = ["execute_sql"]
//! max_iterations = 8
//! temperature = 0.0
//! ```
//!
//! `payload = "task"` makes the supervisor hand off with a typed
//! [`TaskPayload`](crate::tools::TaskPayload) instead of a plain message.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use super::{AgentWorker, Worker};
use crate::agent::DEFAULT_MAX_ITERATIONS;
use crate::error::{Error, Result};
use crate::llm::ChatModel;
use crate::tools::ToolRegistry;

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct WorkerFile {
    worker: WorkerSpec,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    #[default]
    Message,
    Task,
}

/// A worker's declaration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub preamble: String,
    /// Tool names, resolved against a [`ToolRegistry`] at build time.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub payload: PayloadKind,
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

impl WorkerSpec {
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: WorkerFile =
            toml::from_str(content).map_err(|e| Error::Config(format!("bad worker config: {e}")))?;
        file.worker.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::Config(format!(
                "worker name {:?} must be non-empty ASCII letters, digits, '_' or '-'",
                self.name
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::Config(format!(
                "worker {}: max_iterations must be at least 1",
                self.name
            )));
        }
        Ok(self)
    }

    /// Build the agent-backed worker, resolving tools from `tools`.
    pub fn build(&self, model: Arc<dyn ChatModel>, tools: &ToolRegistry) -> Result<AgentWorker> {
        let selected = tools.select(&self.tools).map_err(|e| {
            Error::Config(format!("worker {} references an unavailable tool: {e}", self.name))
        })?;
        Ok(AgentWorker::new(self.clone(), model, selected))
    }
}

/// Registry of loaded worker specs, indexed by name.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    specs: BTreeMap<String, WorkerSpec>,
}

impl WorkerRegistry {
    /// Create an empty registry with no workers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load all `.toml` files from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Config(format!("cannot read worker dir {}: {e}", dir.display()))
        })?;

        let mut registry = Self::empty();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                let content = std::fs::read_to_string(&path)?;
                let spec = WorkerSpec::from_toml(&content)
                    .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
                registry.insert(spec)?;
            }
        }

        info!(dir = %dir.display(), workers = registry.len(), "loaded worker definitions");
        Ok(registry)
    }

    /// Add a spec; names must be unique.
    pub fn insert(&mut self, spec: WorkerSpec) -> Result<()> {
        if self.specs.contains_key(&spec.name) {
            return Err(Error::Config(format!("duplicate worker name: {}", spec.name)));
        }
        self.specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Look up a worker spec by name.
    pub fn get(&self, name: &str) -> Option<&WorkerSpec> {
        self.specs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Build every declared worker, in name order.
    pub fn build_all(
        &self,
        model: Arc<dyn ChatModel>,
        tools: &ToolRegistry,
    ) -> Result<Vec<Arc<dyn Worker>>> {
        self.specs
            .values()
            .map(|spec| {
                spec.build(Arc::clone(&model), tools)
                    .map(|worker| Arc::new(worker) as Arc<dyn Worker>)
            })
            .collect()
    }
}
