//! In-memory store: the default for tests and one-shot runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use toolmark_core::error::MemoryError;
use toolmark_core::memory::{MemoryEntry, MemoryRole, MemoryStats, MemoryStore};
use toolmark_core::{AgentDefinition, ToolDefinition};

/// Everything a store holds. Shared by [`InMemoryStore`] and
/// [`crate::FileStore`]; the latter persists it after each mutation.
#[derive(Debug, Default)]
pub struct MemoryState {
    pub(crate) agents: HashMap<String, AgentDefinition>,
    pub(crate) tools: BTreeMap<String, ToolDefinition>,
    pub(crate) entries: Vec<MemoryEntry>,
    pub(crate) next_id: u64,
}

impl MemoryState {
    pub(crate) fn append(
        &mut self,
        agent_name: &str,
        role: MemoryRole,
        content: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> MemoryEntry {
        self.next_id += 1;
        let entry = MemoryEntry {
            id: self.next_id,
            agent_name: agent_name.to_string(),
            role,
            content: content.to_string(),
            metadata,
            timestamp: Utc::now(),
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Restore an entry read back from disk, keeping id order monotonic.
    pub(crate) fn restore(&mut self, entry: MemoryEntry) {
        self.next_id = self.next_id.max(entry.id);
        self.entries.push(entry);
    }

    pub(crate) fn recent(&self, agent_name: &str, limit: usize) -> Vec<MemoryEntry> {
        let mine: Vec<&MemoryEntry> = self
            .entries
            .iter()
            .filter(|e| e.agent_name == agent_name)
            .collect();
        let skip = mine.len().saturating_sub(limit);
        mine.into_iter().skip(skip).cloned().collect()
    }

    pub(crate) fn prune(&mut self, agent_name: &str, keep_last: usize) -> usize {
        let mine: Vec<u64> = self
            .entries
            .iter()
            .filter(|e| e.agent_name == agent_name)
            .map(|e| e.id)
            .collect();
        let excess = mine.len().saturating_sub(keep_last);
        if excess == 0 {
            return 0;
        }
        let doomed: HashSet<u64> = mine.into_iter().take(excess).collect();
        self.entries.retain(|e| !doomed.contains(&e.id));
        excess
    }

    pub(crate) fn stats(&self) -> MemoryStats {
        let mut memory_per_agent = HashMap::new();
        for entry in &self.entries {
            *memory_per_agent.entry(entry.agent_name.clone()).or_insert(0) += 1;
        }
        MemoryStats {
            total_entries: self.entries.len(),
            memory_per_agent,
            agents: self.agents.len(),
            tools: self.tools.len(),
        }
    }

    pub(crate) fn sorted_agents(&self) -> Vec<AgentDefinition> {
        let mut agents: Vec<_> = self.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        agents
    }
}

/// A store that keeps agents, tools, and the per-agent log in memory.
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_agent(&self, name: &str) -> Result<Option<AgentDefinition>, MemoryError> {
        Ok(self.state.read().await.agents.get(name).cloned())
    }

    async fn upsert_agent(&self, mut agent: AgentDefinition) -> Result<(), MemoryError> {
        agent.updated_at = Utc::now();
        self.state.write().await.agents.insert(agent.name.clone(), agent);
        Ok(())
    }

    async fn list_agents(&self) -> Result<Vec<AgentDefinition>, MemoryError> {
        Ok(self.state.read().await.sorted_agents())
    }

    async fn add_memory_entry(
        &self,
        agent_name: &str,
        role: MemoryRole,
        content: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<MemoryEntry, MemoryError> {
        Ok(self.state.write().await.append(agent_name, role, content, metadata))
    }

    async fn get_agent_memory(
        &self,
        agent_name: &str,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        Ok(self.state.read().await.recent(agent_name, limit))
    }

    async fn cleanup_agent_memory(
        &self,
        agent_name: &str,
        keep_last: usize,
    ) -> Result<usize, MemoryError> {
        Ok(self.state.write().await.prune(agent_name, keep_last))
    }

    async fn get_tool(&self, name: &str) -> Result<Option<ToolDefinition>, MemoryError> {
        Ok(self.state.read().await.tools.get(name).cloned())
    }

    async fn register_tool(&self, tool: ToolDefinition) -> Result<(), MemoryError> {
        self.state.write().await.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, MemoryError> {
        Ok(self.state.read().await.tools.values().cloned().collect())
    }

    async fn get_memory_stats(&self) -> Result<MemoryStats, MemoryError> {
        Ok(self.state.read().await.stats())
    }
}
