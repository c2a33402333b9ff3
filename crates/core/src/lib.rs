//! # toolmark core
//!
//! Domain types, collaborator traits, and error definitions for the toolmark
//! agent loop. The loop itself lives in `toolmark-agent`; everything it talks
//! to (memory, generation, tool execution) is defined here as a trait so the
//! concrete backends can be swapped or mocked.
//!
//! ## Layout
//!
//! - [`agent`]: agent definitions as stored by the memory collaborator
//! - [`memory`]: memory entries and the [`MemoryStore`] trait
//! - [`provider`]: the [`Provider`] backend trait and the [`Generator`] facade
//! - [`tool`]: text-extracted [`ToolCall`]s, outcomes, and the tool traits
//! - [`event`]: broadcast bus for execution lifecycle events

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod memory;
pub mod agent;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use provider::{GenerationConfig, GenerationResponse, Generator, Provider};
pub use tool::{Tool, ToolCall, ToolDefinition, ToolExecutor, ToolOutcome, ToolRegistry};
pub use memory::{MemoryEntry, MemoryRole, MemoryStats, MemoryStore};
pub use agent::{AgentDefinition, ExecutionContext};
pub use event::{DomainEvent, EventBus};
