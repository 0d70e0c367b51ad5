//! # supervisor-rs
//!
//! Memory-aware supervisor graph for multi-agent analytic assistants.
//!
//! A turn enters the memory router, which recalls related long-term
//! memories and decides whether the user's message is worth remembering.
//! The supervisor then either hands the task to a specialised worker (which
//! returns control to the router) or answers; the answer is what the staged
//! memory write is committed against.
//!
//! Long-term memory lives in Postgres + pgvector when configured, otherwise
//! in process. LLM and embedding calls go through rig-core; everything is
//! traced with OpenTelemetry.

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod model;
pub mod telemetry;
pub mod tools;
pub mod worker;

pub use error::{Error, Result};
pub use graph::{SupervisorGraph, TurnOutcome};
pub use model::{ConversationState, Message};
