//! Memory record types shared by every backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Open key-value metadata attached to a memory item.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A durable long-term memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    /// Present only if an embedding service answered at write time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryItem {
    /// True when every filter key is present with an equal value.
    pub fn matches(&self, filters: &Metadata) -> bool {
        filters
            .iter()
            .all(|(key, value)| self.metadata.get(key) == Some(value))
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    /// Relevance signal; cosine similarity or lexical overlap, not a fixed scale.
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    Ok,
    NotFound,
}

/// Outcome of `write` / `update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub id: String,
    pub status: WriteStatus,
}

impl WriteReceipt {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: WriteStatus::Ok,
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: WriteStatus::NotFound,
        }
    }
}

/// Outcome of `delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReceipt {
    pub deleted: u64,
}
