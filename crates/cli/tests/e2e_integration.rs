//! End-to-end integration tests for the toolmark execution loop.
//!
//! These drive the real store, tool manager, provider router, and executor
//! together. Only the LLM backend is scripted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::json;
use toolmark_agent::{AgentExecutor, ExecutionPhase, ExecutorSettings, ToolCallExtractor};
use toolmark_config::AppConfig;
use toolmark_core::error::ProviderError;
use toolmark_core::event::DomainEvent;
use toolmark_core::memory::{MemoryRole, MemoryStore};
use toolmark_core::message::{Message, Role};
use toolmark_core::provider::{GenerationConfig, GenerationResponse, Provider};
use toolmark_core::{AgentDefinition, ExecutionContext, ToolCall};
use toolmark_memory::{FileStore, InMemoryStore};
use toolmark_providers::ProviderRouter;
use toolmark_tools::{RateLimiterRegistry, ToolManager, default_registry};

// ── Scripted backend ─────────────────────────────────────────────────────

/// A backend that answers from a queue and records every request.
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Arc<Self> {
        Self::with_results(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    fn with_results(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn generate(
        &self,
        messages: &[Message],
        model: &str,
        _config: &GenerationConfig,
    ) -> Result<GenerationResponse, ProviderError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let n = self.requests.lock().unwrap().len();
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider exhausted at request #{n}"))?;
        Ok(GenerationResponse {
            content,
            model: model.to_string(),
            provider: "e2e_scripted".into(),
            usage: None,
        })
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────

fn router_with(provider: Arc<ScriptedProvider>) -> ProviderRouter {
    let mut router = ProviderRouter::new("scripted");
    router.register("scripted", provider);
    router
}

async fn tools_for(memory: Arc<dyn MemoryStore>) -> Arc<ToolManager> {
    let limits = Arc::new(RateLimiterRegistry::with_common_limits());
    let manager = ToolManager::new(default_registry(limits)).with_memory(memory);
    assert_eq!(manager.sync_catalog().await.unwrap(), 2);
    Arc::new(manager)
}

async fn executor_for(memory: Arc<dyn MemoryStore>, provider: Arc<ScriptedProvider>) -> AgentExecutor {
    let tools = tools_for(memory.clone()).await;
    AgentExecutor::new(memory, Arc::new(router_with(provider)), tools)
}

fn site_checker() -> AgentDefinition {
    AgentDefinition::new("site_checker", "Website availability monitor")
        .with_backstory("Always check the site with a tool before answering.")
        .with_tools(["website_monitor", "http_client"])
}

fn empty() -> ExecutionContext {
    ExecutionContext::new()
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_direct_answer_no_tools() {
    let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
    memory.upsert_agent(AgentDefinition::new("writer", "Summarizer")).await.unwrap();
    let provider = ScriptedProvider::new(&["X is a tiny utility library."]);
    let executor = executor_for(memory.clone(), provider.clone()).await;

    let result = executor.run("writer", "summarize X", &empty()).await.unwrap();

    assert_eq!(result.answer, "X is a tiny utility library.");
    assert!(!result.escalated);
    assert!(result.tool_results.is_empty());

    // Prompt-plus-history path: the prompt arrives as the last user turn
    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    let last = requests[0].last().unwrap();
    assert_eq!(last.role, Role::User);
    assert!(last.content.starts_with("You are writer: Summarizer"));
    assert!(last.content.contains("You have no tools available."));
}

#[tokio::test]
async fn e2e_escalation_falls_back_to_real_website_monitor() {
    let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
    memory.upsert_agent(site_checker()).await.unwrap();
    let provider = ScriptedProvider::new(&[
        "I am sure the site is fine.",
        "Yes, it is fine.",
        "The health endpoint is unreachable.",
    ]);
    let executor = executor_for(memory.clone(), provider.clone()).await;

    let result = executor
        .run("site_checker", "check http://127.0.0.1:1/health is up", &empty())
        .await
        .unwrap();

    assert!(result.escalated && result.synthesized);
    assert_eq!(result.tool_results.len(), 1);
    // Connection failures are reported in the tool's result, not raised
    let toolmark_core::ToolOutcome::Success { tool, result: check } = &result.tool_results[0] else {
        panic!("website_monitor should report unreachable hosts as a result");
    };
    assert_eq!(tool, "website_monitor");
    assert_eq!(check["url"], "http://127.0.0.1:1/health");
    assert!(check["status"] == "error" || check["status"] == "timeout");

    let requests = provider.requests();
    assert_eq!(requests.len(), 3);
    let instruction = &requests[1].last().unwrap().content;
    assert!(instruction.contains("TOOL_CALL: website_monitor(url=http://127.0.0.1:1/health, expected_status=200)"));
    assert_eq!(requests[2][0].role, Role::System);
    assert!(
        requests[2]
            .iter()
            .any(|m| m.content.starts_with("Tool website_monitor result: "))
    );
    assert_eq!(result.answer, "The health endpoint is unreachable.");
    assert_eq!(result.phases.last(), Some(&ExecutionPhase::Completed));
}

#[tokio::test]
async fn e2e_invalid_arguments_become_observations() {
    let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
    memory.upsert_agent(site_checker()).await.unwrap();
    let provider = ScriptedProvider::new(&[
        "TOOL_CALL: http_client(method=GET)",
        "I could not make the request.",
    ]);
    let executor = executor_for(memory.clone(), provider.clone()).await;

    let result = executor
        .run("site_checker", "call the status api", &empty())
        .await
        .unwrap();

    assert!(!result.tool_results[0].is_success());
    let final_request = provider.requests().pop().unwrap();
    let observation = &final_request[final_request.len() - 2].content;
    assert_eq!(
        observation,
        "Tool http_client failed: Invalid tool arguments: Required parameter 'url' is missing"
    );

    let log = memory.get_agent_memory("site_checker", 20).await.unwrap();
    let output = log.iter().find(|e| e.role == MemoryRole::ToolOutput).unwrap();
    assert!(output.content.starts_with("Tool: http_client\nError: "));
}

#[tokio::test]
async fn e2e_disabled_tool_is_refused_and_unlisted() {
    let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
    memory.upsert_agent(site_checker()).await.unwrap();
    let provider = ScriptedProvider::new(&[
        "TOOL_CALL: website_monitor(url=https://example.org)",
        "Monitoring is switched off.",
    ]);
    let executor = executor_for(memory.clone(), provider.clone()).await;

    let mut def = memory.get_tool("website_monitor").await.unwrap().unwrap();
    def.enabled = false;
    memory.register_tool(def).await.unwrap();

    let result = executor
        .run("site_checker", "check https://example.org", &empty())
        .await
        .unwrap();

    let toolmark_core::ToolOutcome::Failure { error, .. } = &result.tool_results[0] else {
        panic!("disabled tool must fail");
    };
    assert_eq!(error, "Tool is disabled: website_monitor");

    let requests = provider.requests();
    let prompt = &requests[0].last().unwrap().content;
    assert!(prompt.contains("Available Tools: http_client\n"));
}

#[tokio::test]
async fn e2e_router_falls_back_to_backup_provider() {
    let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
    memory.upsert_agent(AgentDefinition::new("writer", "Summarizer")).await.unwrap();

    let primary = ScriptedProvider::with_results(vec![Err(ProviderError::Network("refused".into()))]);
    let backup = ScriptedProvider::new(&["Answer from the backup."]);
    let mut router = ProviderRouter::new("primary").with_fallback(vec!["backup".into()]);
    router.register("primary", primary.clone());
    router.register("backup", backup.clone());

    let tools = tools_for(memory.clone()).await;
    let executor = AgentExecutor::new(memory, Arc::new(router), tools);

    let answer = executor.execute("writer", "summarize", &empty()).await.unwrap();
    assert_eq!(answer, "Answer from the backup.");
    assert_eq!(primary.requests().len(), 1);
    assert_eq!(backup.requests().len(), 1);
}

#[tokio::test]
async fn e2e_generation_failure_is_recorded() {
    let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
    memory.upsert_agent(AgentDefinition::new("writer", "Summarizer")).await.unwrap();
    let provider = ScriptedProvider::with_results(vec![Err(ProviderError::AuthenticationFailed("bad key".into()))]);
    let executor = executor_for(memory.clone(), provider).await;

    let err = executor.run("writer", "summarize", &empty()).await.unwrap_err();
    assert!(err.to_string().contains("Authentication failed: bad key"));

    let log = memory.get_agent_memory("writer", 20).await.unwrap();
    assert_eq!(log.last().unwrap().role, MemoryRole::Thought);
    assert_eq!(log.last().unwrap().metadata["task"], "summarize");
}

#[tokio::test]
async fn e2e_file_store_keeps_history_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.jsonl");

    {
        let memory: Arc<dyn MemoryStore> = Arc::new(FileStore::open(path.clone()));
        memory.upsert_agent(AgentDefinition::new("writer", "Summarizer")).await.unwrap();
        let executor = executor_for(memory, ScriptedProvider::new(&["first answer"])).await;
        executor.run("writer", "first task", &empty()).await.unwrap();
    }

    let memory: Arc<dyn MemoryStore> = Arc::new(FileStore::open(path));
    let provider = ScriptedProvider::new(&["second answer"]);
    let executor = executor_for(memory.clone(), provider.clone())
        .await
        .with_settings(ExecutorSettings {
            memory_window: 3,
            ..ExecutorSettings::default()
        });
    executor.run("writer", "second task", &empty()).await.unwrap();

    let sent: Vec<String> = provider.requests()[0].iter().map(|m| m.content.clone()).collect();
    assert_eq!(&sent[..3], ["first task", "first answer", "second task"]);

    // Retention pruned the oldest entry
    let log = memory.get_agent_memory("writer", 100).await.unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].content, "first answer");
}

#[tokio::test]
async fn e2e_lifecycle_events() {
    let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
    memory.upsert_agent(site_checker()).await.unwrap();
    let provider = ScriptedProvider::new(&["TOOL_CALL: http_client(url=ftp://nowhere)", "Done."]);
    let executor = executor_for(memory, provider).await;
    let mut events = executor.event_bus().subscribe();

    executor.run("site_checker", "request the api", &empty()).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(match event.as_ref() {
            DomainEvent::ExecutionStarted { .. } => "started",
            DomainEvent::ResponseGenerated { .. } => "response",
            DomainEvent::Escalated { .. } => "escalated",
            DomainEvent::ToolExecuted { success, .. } => {
                assert!(!success, "ftp URLs are refused by http_client");
                "tool"
            }
            DomainEvent::ExecutionCompleted { .. } => "completed",
            DomainEvent::ExecutionFailed { .. } => "failed",
            DomainEvent::MemoryPruned { .. } => "pruned",
        });
    }
    assert_eq!(kinds, vec!["started", "response", "tool", "completed", "pruned"]);
}

#[tokio::test]
async fn e2e_extractor_against_registered_catalogue() {
    let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
    tools_for(memory.clone()).await;
    let extractor = ToolCallExtractor::from_definitions(&memory.list_tools().await.unwrap());

    let call = ToolCall::new("http_client")
        .with_param("url", "https://api.example.com")
        .with_param("method", "POST")
        .with_param("data", json!({"a": 1}));
    assert_eq!(extractor.extract(&call.render()), vec![call]);

    let text = r#"TOOL_CALL: http_client(url=https://api.example.com, body={"a": 1})
TOOL_CALL: shell(cmd=rm)"#;
    let calls = extractor.extract(text);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].parameters["data"], json!({"a": 1}));
}

#[test]
fn e2e_config_defaults_and_validation() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.default_model, "granite3.2:2b");
    assert_eq!(ExecutorSettings::from_config(&config).effective_iterations(), 3);

    let parsed: AppConfig = toml::from_str(&AppConfig::default_toml()).unwrap();
    assert_eq!(parsed.agents[0].tools, vec!["website_monitor"]);

    let mut bad = AppConfig::default();
    bad.max_agent_memory_entries = 0;
    assert!(bad.validate().is_err());
}
