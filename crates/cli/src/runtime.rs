//! Wiring shared by the commands: store, tools, and the executor.

use std::sync::Arc;
use std::time::Duration;
use toolmark_agent::{AgentExecutor, ContextFilter, ExecutorSettings};
use toolmark_config::AppConfig;
use toolmark_core::memory::MemoryStore;
use toolmark_memory::{FileStore, InMemoryStore};
use toolmark_providers::build_from_config;
use toolmark_tools::{RateLimiterRegistry, ToolManager, default_registry};
use tracing::debug;

pub struct Runtime {
    pub config: AppConfig,
    pub memory: Arc<dyn MemoryStore>,
    pub tools: Arc<ToolManager>,
    pub limits: Arc<RateLimiterRegistry>,
}

impl Runtime {
    /// Open the store, publish the tool catalogue, and load configured agents.
    pub async fn bootstrap(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let memory: Arc<dyn MemoryStore> = match config.memory.backend.as_str() {
            "memory" => Arc::new(InMemoryStore::new()),
            "file" => Arc::new(FileStore::open(config.memory.resolved_path())),
            other => return Err(format!("Unknown memory backend '{other}' (expected memory or file)").into()),
        };

        let limits = Arc::new(rate_limits(&config));
        let tools = Arc::new(ToolManager::new(default_registry(limits.clone())).with_memory(memory.clone()));
        let synced = tools.sync_catalog().await?;

        for agent in &config.agents {
            memory.upsert_agent(agent.to_definition()).await?;
        }
        debug!(
            backend = memory.name(),
            tools = synced,
            agents = config.agents.len(),
            "Runtime ready"
        );

        Ok(Self {
            config,
            memory,
            tools,
            limits,
        })
    }

    /// An executor backed by the configured providers.
    pub async fn executor(&self) -> AgentExecutor {
        let mut router = build_from_config(&self.config);
        router.load_models().await;

        AgentExecutor::new(self.memory.clone(), Arc::new(router), self.tools.clone())
            .with_settings(ExecutorSettings::from_config(&self.config))
            .with_context_filter(ContextFilter::from_config(&self.config.context))
    }
}

/// The common limits, overridden or extended by the config.
pub fn rate_limits(config: &AppConfig) -> RateLimiterRegistry {
    let mut registry = RateLimiterRegistry::with_common_limits();
    for (name, limit) in &config.rate_limits {
        registry.add(
            name.clone(),
            limit.max_requests as usize,
            Duration::from_secs(limit.window_secs),
        );
    }
    registry
}
