//! Shared test doubles for the execution loop.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use toolmark_core::error::{MemoryError, ProviderError, ToolError};
use toolmark_core::memory::{MemoryEntry, MemoryRole, MemoryStats, MemoryStore};
use toolmark_core::message::Message;
use toolmark_core::provider::{GenerationConfig, GenerationResponse, Generator, Provider};
use toolmark_core::tool::{ToolCall, ToolDefinition, ToolExecutor, ToolParameters};
use toolmark_core::AgentDefinition;
use toolmark_memory::InMemoryStore;

// ── Generation ────────────────────────────────────────────────────────────

/// One request seen by the scripted generator.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationCall {
    /// Through `Generator::generate_response`
    Prompt {
        prompt: String,
        model: String,
        history: Vec<Message>,
    },
    /// Through `Provider::generate`
    Messages { model: String, messages: Vec<Message> },
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<String, ProviderError>>,
    calls: Vec<GenerationCall>,
}

impl Script {
    fn next(&mut self, call: GenerationCall) -> Result<String, ProviderError> {
        let n = self.calls.len() + 1;
        self.calls.push(call);
        self.replies
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedGenerator: no reply left for call #{n}"))
    }
}

/// A generator that returns queued replies in order, whichever entry point
/// is used. Panics when the script runs out.
///
/// By default no provider resolves, so the loop's direct-generation path
/// falls back to `generate_response`. `with_provider` exposes a backend
/// sharing the same script.
pub struct ScriptedGenerator {
    script: Arc<Mutex<Script>>,
    with_provider: bool,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn from_results(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                replies: replies.into(),
                calls: Vec::new(),
            })),
            with_provider: false,
        }
    }

    pub fn with_provider(mut self) -> Self {
        self.with_provider = true;
        self
    }

    pub fn calls(&self) -> Vec<GenerationCall> {
        self.script.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate_response(
        &self,
        prompt: &str,
        model: &str,
        chat_history: &[Message],
    ) -> Result<String, ProviderError> {
        self.script.lock().unwrap().next(GenerationCall::Prompt {
            prompt: prompt.to_string(),
            model: model.to_string(),
            history: chat_history.to_vec(),
        })
    }

    fn resolve_model(&self, model: &str) -> (String, String) {
        let provider = if self.with_provider { "scripted" } else { "none" };
        (provider.to_string(), model.to_string())
    }

    fn provider(&self, provider_id: &str) -> Option<Arc<dyn Provider>> {
        (self.with_provider && provider_id == "scripted").then(|| {
            Arc::new(ScriptedProvider {
                script: self.script.clone(),
            }) as Arc<dyn Provider>
        })
    }
}

struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        messages: &[Message],
        model: &str,
        _config: &GenerationConfig,
    ) -> Result<GenerationResponse, ProviderError> {
        let content = self.script.lock().unwrap().next(GenerationCall::Messages {
            model: model.to_string(),
            messages: messages.to_vec(),
        })?;
        Ok(GenerationResponse {
            content,
            model: model.to_string(),
            provider: "scripted".into(),
            usage: None,
        })
    }
}

// ── Tools ─────────────────────────────────────────────────────────────────

/// Returns canned results per tool name and records every call.
/// Unknown tools fail with `ToolError::NotFound`.
#[derive(Default)]
pub struct RecordingToolExecutor {
    results: HashMap<String, Result<Value, ToolError>>,
    calls: Mutex<Vec<ToolCall>>,
}

impl RecordingToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, tool_name: &str, result: Value) -> Self {
        self.results.insert(tool_name.to_string(), Ok(result));
        self
    }

    pub fn with_failure(mut self, tool_name: &str, error: ToolError) -> Self {
        self.results.insert(tool_name.to_string(), Err(error));
        self
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingToolExecutor {
    async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: &ToolParameters,
        _caller: Option<&str>,
    ) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push(ToolCall {
            tool_name: tool_name.to_string(),
            parameters: parameters.clone(),
        });
        self.results
            .get(tool_name)
            .cloned()
            .unwrap_or_else(|| Err(ToolError::NotFound(tool_name.to_string())))
    }
}

// ── Memory ────────────────────────────────────────────────────────────────

/// An in-memory store that counts cleanups and can be told to fail them.
#[derive(Default)]
pub struct CountingMemory {
    inner: InMemoryStore,
    cleanups: AtomicUsize,
    fail_cleanup: AtomicBool,
}

impl CountingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    pub fn fail_cleanup(&self) {
        self.fail_cleanup.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MemoryStore for CountingMemory {
    fn name(&self) -> &str {
        "counting"
    }

    async fn get_agent(&self, name: &str) -> Result<Option<AgentDefinition>, MemoryError> {
        self.inner.get_agent(name).await
    }

    async fn upsert_agent(&self, agent: AgentDefinition) -> Result<(), MemoryError> {
        self.inner.upsert_agent(agent).await
    }

    async fn list_agents(&self) -> Result<Vec<AgentDefinition>, MemoryError> {
        self.inner.list_agents().await
    }

    async fn add_memory_entry(
        &self,
        agent_name: &str,
        role: MemoryRole,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<MemoryEntry, MemoryError> {
        self.inner.add_memory_entry(agent_name, role, content, metadata).await
    }

    async fn get_agent_memory(&self, agent_name: &str, limit: usize) -> Result<Vec<MemoryEntry>, MemoryError> {
        self.inner.get_agent_memory(agent_name, limit).await
    }

    async fn cleanup_agent_memory(&self, agent_name: &str, keep_last: usize) -> Result<usize, MemoryError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        if self.fail_cleanup.load(Ordering::SeqCst) {
            return Err(MemoryError::Storage("cleanup refused".into()));
        }
        self.inner.cleanup_agent_memory(agent_name, keep_last).await
    }

    async fn get_tool(&self, name: &str) -> Result<Option<ToolDefinition>, MemoryError> {
        self.inner.get_tool(name).await
    }

    async fn register_tool(&self, tool: ToolDefinition) -> Result<(), MemoryError> {
        self.inner.register_tool(tool).await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, MemoryError> {
        self.inner.list_tools().await
    }

    async fn get_memory_stats(&self) -> Result<MemoryStats, MemoryError> {
        self.inner.get_memory_stats().await
    }
}
