//! Agent status reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use toolmark_core::error::{Error, Result};
use toolmark_core::memory::{MemoryRole, MemoryStore};

const RECENT_ACTIVITY: usize = 5;
const PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Active,
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub role: MemoryRole,
    pub preview: String,
    pub timestamp: DateTime<Utc>,
}

/// A snapshot of one agent's definition and recent memory.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatusReport {
    pub status: AgentState,
    pub name: String,
    pub role: String,
    pub tools: Vec<String>,
    pub model: Option<String>,
    /// Newest last
    pub recent_activity: Vec<ActivityEntry>,
    pub total_memory_entries: usize,
    pub memory_limit: usize,
    pub last_update: DateTime<Utc>,
}

impl AgentStatusReport {
    pub async fn collect(memory: &dyn MemoryStore, agent_name: &str, memory_limit: usize) -> Result<Self> {
        let agent = memory
            .get_agent(agent_name)
            .await?
            .ok_or_else(|| Error::AgentNotFound(agent_name.to_string()))?;

        let recent = memory.get_agent_memory(agent_name, RECENT_ACTIVITY).await?;
        let stats = memory.get_memory_stats().await?;

        let last_update = recent
            .last()
            .map(|entry| entry.timestamp)
            .unwrap_or(agent.updated_at);

        Ok(Self {
            status: if agent.enabled {
                AgentState::Active
            } else {
                AgentState::Disabled
            },
            recent_activity: recent
                .into_iter()
                .map(|entry| ActivityEntry {
                    role: entry.role,
                    preview: entry.content.chars().take(PREVIEW_CHARS).collect(),
                    timestamp: entry.timestamp,
                })
                .collect(),
            total_memory_entries: stats.memory_per_agent.get(agent_name).copied().unwrap_or(0),
            memory_limit,
            last_update,
            name: agent.name,
            role: agent.role,
            tools: agent.tools,
            model: agent.model,
        })
    }
}
