//! File-based memory store: persistent JSON-lines storage.
//!
//! Each line is one tagged record: an agent definition, a tool definition,
//! or a log entry. The whole state is loaded on open and rewritten after
//! every mutation.
//!
//! Storage location: `~/.toolmark/memory.jsonl` unless configured otherwise.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use toolmark_core::error::MemoryError;
use toolmark_core::memory::{MemoryEntry, MemoryRole, MemoryStats, MemoryStore};
use toolmark_core::{AgentDefinition, ToolDefinition};
use tracing::{debug, warn};

use crate::in_memory::MemoryState;

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record {
    Agent(AgentDefinition),
    Tool(ToolDefinition),
    Entry(MemoryEntry),
}

/// A file-backed store using JSONL (one record per line).
pub struct FileStore {
    path: PathBuf,
    state: Arc<RwLock<MemoryState>>,
}

impl FileStore {
    /// Open a store at the given path.
    ///
    /// If the file exists, records are loaded from it. Otherwise the store
    /// starts empty and the file is created on first write.
    pub fn open(path: PathBuf) -> Self {
        let state = Self::load_from_disk(&path);
        debug!(
            path = %path.display(),
            entries = state.entries.len(),
            agents = state.agents.len(),
            "File memory store loaded"
        );
        Self {
            path,
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> MemoryState {
        let mut state = MemoryState::default();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return state,
        };

        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<Record>(line) {
                Ok(Record::Agent(agent)) => {
                    state.agents.insert(agent.name.clone(), agent);
                }
                Ok(Record::Tool(tool)) => {
                    state.tools.insert(tool.name.clone(), tool);
                }
                Ok(Record::Entry(entry)) => state.restore(entry),
                Err(e) => warn!(error = %e, "Skipping corrupted memory record"),
            }
        }
        state
    }

    /// Rewrite the whole file from `state`.
    ///
    /// Callers hold the write guard across this call, so snapshots reach
    /// the disk in mutation order.
    async fn persist(&self, state: &MemoryState) -> Result<(), MemoryError> {
        let mut content = String::new();
        let records = state
            .sorted_agents()
            .into_iter()
            .map(Record::Agent)
            .chain(state.tools.values().cloned().map(Record::Tool))
            .chain(state.entries.iter().cloned().map(Record::Entry));
        for record in records {
            let line = serde_json::to_string(&record).map_err(|e| {
                MemoryError::Storage(format!("Failed to serialize memory record: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl MemoryStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_agent(&self, name: &str) -> Result<Option<AgentDefinition>, MemoryError> {
        Ok(self.state.read().await.agents.get(name).cloned())
    }

    async fn upsert_agent(&self, mut agent: AgentDefinition) -> Result<(), MemoryError> {
        agent.updated_at = Utc::now();
        let mut state = self.state.write().await;
        state.agents.insert(agent.name.clone(), agent);
        self.persist(&state).await
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
        let mut state = self.state.write().await;
        let entry = state.append(agent_name, role, content, metadata);
        self.persist(&state).await?;
        Ok(entry)
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
        let mut state = self.state.write().await;
        let removed = state.prune(agent_name, keep_last);
        if removed > 0 {
            self.persist(&state).await?;
        }
        Ok(removed)
    }

    async fn get_tool(&self, name: &str) -> Result<Option<ToolDefinition>, MemoryError> {
        Ok(self.state.read().await.tools.get(name).cloned())
    }

    async fn register_tool(&self, tool: ToolDefinition) -> Result<(), MemoryError> {
        let mut state = self.state.write().await;
        state.tools.insert(tool.name.clone(), tool);
        self.persist(&state).await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, MemoryError> {
        Ok(self.state.read().await.tools.values().cloned().collect())
    }

    async fn get_memory_stats(&self) -> Result<MemoryStats, MemoryError> {
        Ok(self.state.read().await.stats())
    }
}
