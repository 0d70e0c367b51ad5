//! Process-lifetime memory backend.
//!
//! Each namespace owns its own item list behind a mutex, so writers to
//! different namespaces never contend. The outer map lock is held only to
//! look up or create a namespace slot. Embeddings are computed before any
//! lock is taken.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{MemoryBackend, scoring};
use crate::error::Result;
use crate::llm::Embedder;
use crate::model::{DeleteReceipt, MemoryHit, MemoryItem, Metadata, WriteReceipt};
use crate::telemetry::metrics;

type Slot = Arc<Mutex<Vec<MemoryItem>>>;

pub struct InProcessBackend {
    namespaces: RwLock<HashMap<String, Slot>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl InProcessBackend {
    /// Backend with lexical scoring only.
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            embedder: None,
        }
    }

    /// Backend that embeds content and queries, falling back to lexical
    /// scoring whenever the embedder fails.
    pub fn with_embedder(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            embedder: Some(embedder),
        }
    }

    fn slot(&self, namespace: &str) -> Option<Slot> {
        self.namespaces.read().get(namespace).cloned()
    }

    fn slot_or_create(&self, namespace: &str) -> Slot {
        if let Some(slot) = self.slot(namespace) {
            return slot;
        }
        Arc::clone(
            self.namespaces
                .write()
                .entry(namespace.to_string())
                .or_default(),
        )
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                debug!(error = %e, "embedding unavailable, using lexical scoring");
                None
            }
        }
    }
}

impl Default for InProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryBackend for InProcessBackend {
    fn name(&self) -> &'static str {
        "in_process"
    }

    async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<MemoryHit>> {
        let Some(slot) = self.slot(namespace) else {
            metrics::record_memory_operation("search", self.name(), "ok");
            return Ok(Vec::new());
        };
        let query_embedding = self.embed(query).await;

        let hits: Vec<MemoryHit> = slot
            .lock()
            .iter()
            .map(|item| MemoryHit {
                id: item.id.clone(),
                content: item.content.clone(),
                metadata: item.metadata.clone(),
                score: scoring::score_item(query, query_embedding.as_deref(), item),
            })
            .collect();

        metrics::record_memory_operation("search", self.name(), "ok");
        Ok(scoring::rank(hits, top_k, min_score))
    }

    async fn get(&self, namespace: &str, item_id: &str) -> Result<Option<MemoryItem>> {
        Ok(self
            .slot(namespace)
            .and_then(|slot| slot.lock().iter().find(|item| item.id == item_id).cloned()))
    }

    async fn write(&self, namespace: &str, content: &str, metadata: Metadata) -> Result<WriteReceipt> {
        let embedding = self.embed(content).await;
        let now = Utc::now();
        let item = MemoryItem {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            metadata,
            embedding,
            created_at: now,
            updated_at: now,
        };
        let id = item.id.clone();
        self.slot_or_create(namespace).lock().push(item);

        debug!(namespace, id = %id, "memory written");
        metrics::record_memory_operation("write", self.name(), "ok");
        Ok(WriteReceipt::ok(id))
    }

    async fn update(
        &self,
        namespace: &str,
        item_id: &str,
        content: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<WriteReceipt> {
        let Some(slot) = self.slot(namespace) else {
            metrics::record_memory_operation("update", self.name(), "not_found");
            return Ok(WriteReceipt::not_found(item_id));
        };
        if !slot.lock().iter().any(|item| item.id == item_id) {
            metrics::record_memory_operation("update", self.name(), "not_found");
            return Ok(WriteReceipt::not_found(item_id));
        }

        let embedding = match content {
            Some(text) => Some(self.embed(text).await),
            None => None,
        };

        let mut items = slot.lock();
        // The item may have been deleted while we were embedding.
        let Some(item) = items.iter_mut().find(|item| item.id == item_id) else {
            metrics::record_memory_operation("update", self.name(), "not_found");
            return Ok(WriteReceipt::not_found(item_id));
        };
        if let Some(text) = content {
            item.content = text.to_string();
            item.embedding = embedding.flatten();
        }
        if let Some(patch) = metadata {
            item.metadata.extend(patch);
        }
        item.updated_at = Utc::now();

        metrics::record_memory_operation("update", self.name(), "ok");
        Ok(WriteReceipt::ok(item_id))
    }

    async fn delete(
        &self,
        namespace: &str,
        item_id: Option<&str>,
        filters: Option<&Metadata>,
    ) -> Result<DeleteReceipt> {
        let Some(slot) = self.slot(namespace) else {
            metrics::record_memory_operation("delete", self.name(), "ok");
            return Ok(DeleteReceipt { deleted: 0 });
        };
        let mut items = slot.lock();
        let before = items.len();
        match (item_id, filters) {
            (Some(id), _) => items.retain(|item| item.id != id),
            (None, Some(filters)) => items.retain(|item| !item.matches(filters)),
            (None, None) => items.clear(),
        }
        let deleted = (before - items.len()) as u64;

        metrics::record_memory_operation("delete", self.name(), "ok");
        Ok(DeleteReceipt { deleted })
    }
}
