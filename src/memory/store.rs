//! Persistent memory backend on Postgres + pgvector.
//!
//! Items live in one `memory_items` table keyed by namespace. Search ranks
//! embedded rows by cosine distance in SQL. Rows written while the
//! embedding service was down carry a NULL vector, and rows embedded by a
//! model of another dimension cannot be compared; both are scored lexically.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{MemoryBackend, scoring};
use crate::db::Db;
use crate::error::Result;
use crate::llm::Embedder;
use crate::model::{DeleteReceipt, MemoryHit, MemoryItem, Metadata, WriteReceipt};
use crate::telemetry::metrics;

pub struct PgVectorBackend {
    db: Arc<Db>,
    embedder: Arc<dyn Embedder>,
}

impl PgVectorBackend {
    pub fn new(db: Arc<Db>, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, embedder }
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        match self.embedder.embed(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(error = %e, "embedding failed, storing/searching without vector");
                None
            }
        }
    }

    async fn vector_hits(
        &self,
        namespace: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<MemoryHit>> {
        let rows: Vec<ScoredRow> = sqlx::query_as(
            "SELECT id, content, metadata, 1 - (embedding <=> $2::vector) AS score
             FROM memory_items
             WHERE namespace = $1
             AND embedding IS NOT NULL
             AND vector_dims(embedding) = vector_dims($2::vector)
             ORDER BY embedding <=> $2::vector, created_at
             LIMIT $3",
        )
        .bind(namespace)
        .bind(format_vector(embedding))
        .bind(top_k as i64)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(MemoryHit::from).collect())
    }

    /// Lexically score every row the vector pass cannot rank: all rows when
    /// the query has no vector, else unembedded or dimension-mismatched ones.
    async fn lexical_hits(
        &self,
        namespace: &str,
        query: &str,
        query_vector: Option<&[f32]>,
    ) -> Result<Vec<MemoryHit>> {
        let rows: Vec<PlainRow> = sqlx::query_as(
            "SELECT id, content, metadata
             FROM memory_items
             WHERE namespace = $1
             AND ($2::vector IS NULL
                  OR embedding IS NULL
                  OR vector_dims(embedding) <> vector_dims($2::vector))
             ORDER BY created_at",
        )
        .bind(namespace)
        .bind(query_vector.map(format_vector))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let score = scoring::lexical_overlap(query, &row.content);
                MemoryHit {
                    id: row.id.to_string(),
                    content: row.content,
                    metadata: into_metadata(row.metadata),
                    score,
                }
            })
            .collect())
    }
}

#[async_trait]
impl MemoryBackend for PgVectorBackend {
    fn name(&self) -> &'static str {
        "pgvector"
    }

    async fn search(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<MemoryHit>> {
        let hits = match self.embed(query).await {
            Some(embedding) => {
                let mut hits = self.vector_hits(namespace, &embedding, top_k).await?;
                let unranked = self
                    .lexical_hits(namespace, query, Some(embedding.as_slice()))
                    .await?;
                hits.extend(unranked);
                hits
            }
            None => self.lexical_hits(namespace, query, None).await?,
        };
        metrics::record_memory_operation("search", self.name(), "ok");
        Ok(scoring::rank(hits, top_k, min_score))
    }

    async fn get(&self, namespace: &str, item_id: &str) -> Result<Option<MemoryItem>> {
        let Ok(id) = Uuid::parse_str(item_id) else {
            return Ok(None);
        };
        let row: Option<ItemRow> = sqlx::query_as(
            "SELECT id, content, metadata, embedding::text AS embedding, created_at, updated_at
             FROM memory_items
             WHERE namespace = $1 AND id = $2",
        )
        .bind(namespace)
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.map(MemoryItem::from))
    }

    async fn write(&self, namespace: &str, content: &str, metadata: Metadata) -> Result<WriteReceipt> {
        let embedding = self.embed(content).await;
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO memory_items (id, namespace, content, metadata, embedding)
             VALUES ($1, $2, $3, $4, $5::vector)",
        )
        .bind(id)
        .bind(namespace)
        .bind(content)
        .bind(serde_json::Value::Object(metadata))
        .bind(embedding.as_deref().map(format_vector))
        .execute(self.db.pool())
        .await?;

        debug!(namespace, id = %id, "memory written");
        metrics::record_memory_operation("write", self.name(), "ok");
        Ok(WriteReceipt::ok(id.to_string()))
    }

    async fn update(
        &self,
        namespace: &str,
        item_id: &str,
        content: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<WriteReceipt> {
        let Ok(id) = Uuid::parse_str(item_id) else {
            metrics::record_memory_operation("update", self.name(), "not_found");
            return Ok(WriteReceipt::not_found(item_id));
        };
        let embedding = match content {
            Some(text) => self.embed(text).await,
            None => None,
        };

        let result = sqlx::query(
            "UPDATE memory_items SET
                content = COALESCE($3, content),
                embedding = CASE WHEN $3::text IS NULL THEN embedding ELSE $4::vector END,
                metadata = metadata || COALESCE($5::jsonb, '{}'::jsonb),
                updated_at = now()
             WHERE namespace = $1 AND id = $2",
        )
        .bind(namespace)
        .bind(id)
        .bind(content)
        .bind(embedding.as_deref().map(format_vector))
        .bind(metadata.map(serde_json::Value::Object))
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            metrics::record_memory_operation("update", self.name(), "not_found");
            return Ok(WriteReceipt::not_found(item_id));
        }
        metrics::record_memory_operation("update", self.name(), "ok");
        Ok(WriteReceipt::ok(item_id))
    }

    async fn delete(
        &self,
        namespace: &str,
        item_id: Option<&str>,
        filters: Option<&Metadata>,
    ) -> Result<DeleteReceipt> {
        let result = match (item_id, filters) {
            (Some(item_id), _) => {
                let Ok(id) = Uuid::parse_str(item_id) else {
                    return Ok(DeleteReceipt { deleted: 0 });
                };
                sqlx::query("DELETE FROM memory_items WHERE namespace = $1 AND id = $2")
                    .bind(namespace)
                    .bind(id)
                    .execute(self.db.pool())
                    .await?
            }
            // Every filter key must be present with an equal value.
            (None, Some(filters)) => {
                sqlx::query(
                    "DELETE FROM memory_items
                     WHERE namespace = $1
                     AND NOT EXISTS (
                         SELECT 1 FROM jsonb_each($2::jsonb) AS f(key, value)
                         WHERE metadata -> f.key IS DISTINCT FROM f.value
                     )",
                )
                .bind(namespace)
                .bind(serde_json::Value::Object(filters.clone()))
                .execute(self.db.pool())
                .await?
            }
            (None, None) => {
                sqlx::query("DELETE FROM memory_items WHERE namespace = $1")
                    .bind(namespace)
                    .execute(self.db.pool())
                    .await?
            }
        };

        metrics::record_memory_operation("delete", self.name(), "ok");
        Ok(DeleteReceipt {
            deleted: result.rows_affected(),
        })
    }
}

/// Internal row types for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct ScoredRow {
    id: Uuid,
    content: String,
    metadata: serde_json::Value,
    score: f64,
}

#[derive(sqlx::FromRow)]
struct PlainRow {
    id: Uuid,
    content: String,
    metadata: serde_json::Value,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    content: String,
    metadata: serde_json::Value,
    embedding: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRow> for MemoryItem {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id.to_string(),
            content: row.content,
            metadata: into_metadata(row.metadata),
            embedding: row.embedding.as_deref().and_then(parse_vector),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<ScoredRow> for MemoryHit {
    fn from(row: ScoredRow) -> Self {
        Self {
            id: row.id.to_string(),
            content: row.content,
            metadata: into_metadata(row.metadata),
            score: row.score as f32,
        }
    }
}

fn into_metadata(value: serde_json::Value) -> Metadata {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Metadata::new(),
    }
}

/// Format a f32 slice as a pgvector string literal: `"[0.1,0.2,0.3]"`
fn format_vector(v: &[f32]) -> String {
    let inner: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", inner.join(","))
}

/// Parse a pgvector text literal back into floats.
fn parse_vector(text: &str) -> Option<Vec<f32>> {
    let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
    if inner.is_empty() {
        return Some(Vec::new());
    }
    inner.split(',').map(|x| x.trim().parse().ok()).collect()
}
