//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

use crate::error::{Error, Result};
pub use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_NAMESPACE_PREFIX: &str = "supervisor_memories";

#[derive(Debug)]
pub struct Config {
    pub llm_api_key: SecretString,
    pub llm_base_url: Option<String>,
    pub llm_model: String,
    pub temperature: f64,
    pub embedding_model: Option<String>,
    pub embedding_dim: usize,
    pub database_url: Option<SecretString>,
    pub namespace_prefix: String,
    pub workers_dir: PathBuf,
    pub max_graph_steps: usize,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// Only the LLM key is required; a missing `DATABASE_URL` or
    /// `EMBEDDING_MODEL` selects the degraded in-process memory backend.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            llm_api_key: SecretString::from(required_var("OPENAI_API_KEY")?),
            llm_base_url: optional_var("OPENAI_BASE_URL"),
            llm_model: optional_var("OPENAI_LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            temperature: parsed_var("LLM_TEMPERATURE", 0.5)?,
            embedding_model: optional_var("EMBEDDING_MODEL"),
            embedding_dim: parsed_var("EMBEDDING_DIM", 768)?,
            database_url: optional_var("DATABASE_URL").map(SecretString::from),
            namespace_prefix: optional_var("MEMORY_NAMESPACE_PREFIX")
                .unwrap_or_else(|| DEFAULT_NAMESPACE_PREFIX.to_string()),
            workers_dir: optional_var("WORKERS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("workers")),
            max_graph_steps: parsed_var("MAX_GRAPH_STEPS", 25)?,
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Whether the persistent memory backend has enough configuration to be tried.
    pub fn persistent_memory_configured(&self) -> bool {
        self.database_url.is_some() && self.embedding_model.is_some()
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

/// Empty values count as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}
