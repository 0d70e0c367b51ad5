//! Core data model.
//!
//! A turn is a [`ConversationState`] threaded through the supervisor graph.
//! Memory records are partitioned by namespace and outlive the turn.

pub mod memory;
pub mod message;
pub mod state;

pub use memory::{DeleteReceipt, MemoryHit, MemoryItem, Metadata, WriteReceipt, WriteStatus};
pub use message::{Content, ContentPart, Message, Role, ToolCall};
pub use state::{ANONYMOUS_USER, ConversationState, DatasetRef, PendingMemoryWrite, StateUpdate};
