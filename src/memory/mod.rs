//! Long-term semantic memory.
//!
//! Every read and write is scoped by an explicit namespace string of the
//! form `"{prefix}/{identity}"`. Two backends implement the same
//! [`MemoryBackend`] contract: [`InProcessBackend`] (process lifetime,
//! optional embeddings) and [`PgVectorBackend`] (Postgres + pgvector).
//! [`select_backend`] picks one at startup and falls back silently.

pub mod in_process;
pub mod scoring;
pub mod store;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::db::Db;
use crate::error::Result;
use crate::llm::Embedder;
use crate::model::{
    ConversationState, DeleteReceipt, MemoryHit, MemoryItem, Metadata, WriteReceipt,
};

pub use in_process::InProcessBackend;
pub use store::PgVectorBackend;

/// Default result count for memory searches.
pub const DEFAULT_TOP_K: usize = 5;
/// Default relevance floor for memory searches.
pub const DEFAULT_MIN_SCORE: f32 = 0.3;

/// Key-content store with similarity search, partitioned by namespace.
///
/// `Err` means the backend itself could not be reached; an empty or unknown
/// namespace is never an error.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Short backend label for logs and metrics.
    fn name(&self) -> &'static str;

    /// Items scoring at least `min_score`, best first, at most `top_k`.
    async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<MemoryHit>>;

    /// Fetch one item by id; `None` when it is not in this namespace.
    async fn get(&self, namespace: &str, item_id: &str) -> Result<Option<MemoryItem>>;

    async fn write(&self, namespace: &str, content: &str, metadata: Metadata) -> Result<WriteReceipt>;

    /// Replace content (re-embedding it) and/or merge metadata keys.
    async fn update(
        &self,
        namespace: &str,
        item_id: &str,
        content: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<WriteReceipt>;

    /// Delete by id, else by metadata filter (all pairs must match), else
    /// everything in the namespace.
    async fn delete(
        &self,
        namespace: &str,
        item_id: Option<&str>,
        filters: Option<&Metadata>,
    ) -> Result<DeleteReceipt>;
}

/// Resolves namespaces from a fixed prefix and the caller's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespaces {
    prefix: String,
}

impl Namespaces {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn for_identity(&self, identity: &str) -> String {
        format!("{}/{identity}", self.prefix)
    }

    pub fn for_state(&self, state: &ConversationState) -> String {
        self.for_identity(state.identity())
    }

    /// An explicit override wins over the state-derived namespace.
    pub fn resolve(&self, state: &ConversationState, explicit: Option<&str>) -> String {
        match explicit.map(str::trim).filter(|ns| !ns.is_empty()) {
            Some(ns) => ns.to_string(),
            None => self.for_state(state),
        }
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_NAMESPACE_PREFIX)
    }
}

/// Pick the persistent backend when a pool, an embedding service and a
/// passing connectivity probe are all present; otherwise the in-process one.
pub async fn select_backend(
    db: Option<Arc<Db>>,
    embedder: Option<Arc<dyn Embedder>>,
) -> Arc<dyn MemoryBackend> {
    match (db, embedder) {
        (Some(db), Some(embedder)) => match db.health_check().await {
            Ok(()) => {
                info!(backend = "pgvector", "memory backend selected");
                Arc::new(PgVectorBackend::new(db, embedder))
            }
            Err(e) => {
                warn!(error = %e, "persistent memory unreachable, using in-process backend");
                Arc::new(InProcessBackend::with_embedder(embedder))
            }
        },
        (_, Some(embedder)) => {
            info!(backend = "in_process", embeddings = true, "memory backend selected");
            Arc::new(InProcessBackend::with_embedder(embedder))
        }
        (_, None) => {
            info!(backend = "in_process", embeddings = false, "memory backend selected");
            Arc::new(InProcessBackend::new())
        }
    }
}
