//! Memory trait: agent definitions, tool catalogue, and the per-agent log.
//!
//! The execution loop writes a memory entry at every state transition and
//! rebuilds chat history from the most recent entries on the next call.
//! Stores are expected to serialize concurrent writers themselves; the loop
//! holds no lock of its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::agent::AgentDefinition;
use crate::error::MemoryError;
use crate::tool::ToolDefinition;

/// Who produced a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryRole {
    User,
    Assistant,
    ToolOutput,
    Thought,
}

impl MemoryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryRole::User => "user",
            MemoryRole::Assistant => "assistant",
            MemoryRole::ToolOutput => "tool_output",
            MemoryRole::Thought => "thought",
        }
    }
}

/// A single append-only log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Monotonic per-store id
    pub id: u64,

    pub agent_name: String,

    pub role: MemoryRole,

    pub content: String,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    pub timestamp: DateTime<Utc>,
}

/// Aggregate counters reported by a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_entries: usize,
    pub memory_per_agent: HashMap<String, usize>,
    pub agents: usize,
    pub tools: usize,
}

/// The memory collaborator.
///
/// Implementations: in-memory (default, tests) and a JSON snapshot file.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    async fn get_agent(&self, name: &str) -> std::result::Result<Option<AgentDefinition>, MemoryError>;

    /// Insert or replace an agent definition.
    async fn upsert_agent(&self, agent: AgentDefinition) -> std::result::Result<(), MemoryError>;

    async fn list_agents(&self) -> std::result::Result<Vec<AgentDefinition>, MemoryError>;

    /// Append an entry to an agent's log.
    async fn add_memory_entry(
        &self,
        agent_name: &str,
        role: MemoryRole,
        content: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<MemoryEntry, MemoryError>;

    /// The most recent `limit` entries for an agent, oldest first.
    async fn get_agent_memory(
        &self,
        agent_name: &str,
        limit: usize,
    ) -> std::result::Result<Vec<MemoryEntry>, MemoryError>;

    /// Drop all but the newest `keep_last` entries. Returns how many were removed.
    async fn cleanup_agent_memory(
        &self,
        agent_name: &str,
        keep_last: usize,
    ) -> std::result::Result<usize, MemoryError>;

    async fn get_tool(&self, name: &str) -> std::result::Result<Option<ToolDefinition>, MemoryError>;

    async fn register_tool(&self, tool: ToolDefinition) -> std::result::Result<(), MemoryError>;

    /// Every registered tool, sorted by name.
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDefinition>, MemoryError>;

    async fn get_memory_stats(&self) -> std::result::Result<MemoryStats, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_role_serializes_snake_case() {
        let json = serde_json::to_string(&MemoryRole::ToolOutput).unwrap();
        assert_eq!(json, "\"tool_output\"");
        assert_eq!(MemoryRole::Thought.as_str(), "thought");
    }

    #[test]
    fn memory_entry_serialization() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("iteration".into(), serde_json::json!(1));
        let entry = MemoryEntry {
            id: 7,
            agent_name: "monitor".into(),
            role: MemoryRole::Assistant,
            content: "All sites are up".into(),
            metadata,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("All sites are up"));
        assert!(json.contains("\"iteration\":1"));
    }
}
