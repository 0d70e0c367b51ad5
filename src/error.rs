//! Error types for supervisor-rs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("llm call failed: {0}")]
    Llm(String),

    #[error("embedding call failed: {0}")]
    Embedding(String),

    #[error("memory backend error: {0}")]
    Memory(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for tool {tool}: {message}")]
    InvalidToolArguments { tool: String, message: String },

    #[error("unknown worker: {0}")]
    UnknownWorker(String),

    #[error("invalid handoff: {0}")]
    InvalidHandoff(String),

    #[error("graph exceeded {0} steps without reaching a terminal state")]
    RecursionLimit(usize),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
