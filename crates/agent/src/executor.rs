//! The agent execution loop.
//!
//! One call to [`AgentExecutor::run`] drives a single agent through:
//!
//! ```text
//! started → generating ⇄ escalating → executing_tools → requesting_final → completed
//!                                  ↘ error (from anywhere after started)
//! ```
//!
//! Every transition leaves a memory entry behind. Retention cleanup runs
//! exactly once at the end, on success and on failure alike.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;
use toolmark_config::AppConfig;
use toolmark_core::error::{Error, Result};
use toolmark_core::event::{DomainEvent, EventBus};
use toolmark_core::memory::{MemoryEntry, MemoryRole, MemoryStore};
use toolmark_core::message::Message;
use toolmark_core::provider::{GenerationConfig, Generator};
use toolmark_core::tool::{ToolCall, ToolExecutor, ToolOutcome, display_value};
use toolmark_core::{AgentDefinition, ExecutionContext};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::{ContextFilter, PromptBuilder, PromptInput, PromptMetadata};
use crate::escalation::Escalation;
use crate::extract::ToolCallExtractor;

/// Hard ceiling on generation iterations, whatever the configuration says.
pub const MAX_ITERATIONS_CEILING: u32 = 3;

/// The user turn that asks for an answer after tools ran.
pub const FINAL_ANSWER_INSTRUCTION: &str =
    "Based on the tool results above, provide your final answer to the original task.";

const TASK_PREVIEW_CHARS: usize = 100;

// ── Settings ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Configured iteration bound; clamped to `1..=MAX_ITERATIONS_CEILING`.
    pub max_iterations: u32,
    /// History window and retention size.
    pub memory_window: usize,
    /// Model for agents that name none.
    pub default_model: String,
    pub temperature: f32,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_iterations: MAX_ITERATIONS_CEILING,
            memory_window: 20,
            default_model: "granite3.2:2b".into(),
            temperature: 0.7,
        }
    }
}

impl ExecutorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.max_agent_iterations,
            memory_window: config.max_agent_memory_entries,
            default_model: config.default_model.clone(),
            temperature: config.default_temperature,
        }
    }

    pub fn effective_iterations(&self) -> u32 {
        self.max_iterations.clamp(1, MAX_ITERATIONS_CEILING)
    }
}

// ── Result types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Started,
    Generating,
    Escalating,
    ExecutingTools,
    RequestingFinal,
    Completed,
    Error,
}

/// What a successful execution produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub agent: String,
    pub answer: String,
    pub iterations: u32,
    pub tool_results: Vec<ToolOutcome>,
    /// The model was re-prompted for a tool call
    pub escalated: bool,
    /// The executed call was synthesized from the task, not parsed
    pub synthesized: bool,
    pub phases: Vec<ExecutionPhase>,
    pub prompt: PromptMetadata,
}

// ── Per-execution state ───────────────────────────────────────────────────

enum Step {
    Generate,
    Escalate,
    ExecuteTools,
    RequestFinal,
    Complete,
}

impl Step {
    fn phase(&self) -> ExecutionPhase {
        match self {
            Step::Generate => ExecutionPhase::Generating,
            Step::Escalate => ExecutionPhase::Escalating,
            Step::ExecuteTools => ExecutionPhase::ExecutingTools,
            Step::RequestFinal => ExecutionPhase::RequestingFinal,
            Step::Complete => ExecutionPhase::Completed,
        }
    }
}

struct Run {
    id: String,
    agent: AgentDefinition,
    task: String,
    model: String,
    prompt: String,
    history: Vec<Message>,
    extractor: ToolCallExtractor,
    iteration: u32,
    response: String,
    calls: Vec<ToolCall>,
    outcomes: Vec<ToolOutcome>,
    escalated: bool,
    synthesized: bool,
    phases: Vec<ExecutionPhase>,
    prompt_metadata: PromptMetadata,
}

fn metadata(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(TASK_PREVIEW_CHARS).collect()
}

/// Chat turns rebuilt from an agent's log. Thoughts are not replayed.
fn history_from(entries: &[MemoryEntry]) -> Vec<Message> {
    entries
        .iter()
        .filter_map(|entry| match entry.role {
            MemoryRole::User => Some(Message::user(&entry.content)),
            MemoryRole::Assistant => Some(Message::assistant(&entry.content)),
            MemoryRole::ToolOutput => Some(Message::user(format!("Tool output: {}", entry.content))),
            MemoryRole::Thought => None,
        })
        .collect()
}

// ── Executor ──────────────────────────────────────────────────────────────

/// Runs agents against the memory, generation, and tool collaborators.
///
/// `Send + Sync`; share it behind an `Arc` to run agents concurrently.
pub struct AgentExecutor {
    memory: Arc<dyn MemoryStore>,
    generator: Arc<dyn Generator>,
    tools: Arc<dyn ToolExecutor>,
    filter: ContextFilter,
    prompts: PromptBuilder,
    settings: ExecutorSettings,
    event_bus: Arc<EventBus>,
}

impl AgentExecutor {
    pub fn new(
        memory: Arc<dyn MemoryStore>,
        generator: Arc<dyn Generator>,
        tools: Arc<dyn ToolExecutor>,
    ) -> Self {
        Self {
            memory,
            generator,
            tools,
            filter: ContextFilter::new(),
            prompts: PromptBuilder::new(),
            settings: ExecutorSettings::default(),
            event_bus: Arc::new(EventBus::default()),
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_context_filter(mut self, filter: ContextFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run `agent_name` on `task` and return only the final answer.
    pub async fn execute(&self, agent_name: &str, task: &str, context: &ExecutionContext) -> Result<String> {
        Ok(self.run(agent_name, task, context).await?.answer)
    }

    /// Run `agent_name` on `task`.
    ///
    /// Unknown and disabled agents fail before anything is written. Any
    /// later failure is recorded as a thought and returned after cleanup.
    pub async fn run(&self, agent_name: &str, task: &str, context: &ExecutionContext) -> Result<ExecutionResult> {
        let agent = self
            .memory
            .get_agent(agent_name)
            .await?
            .ok_or_else(|| Error::AgentNotFound(agent_name.to_string()))?;
        if !agent.enabled {
            return Err(Error::AgentDisabled(agent_name.to_string()));
        }

        let mut run = Run {
            id: Uuid::new_v4().to_string(),
            model: agent
                .model
                .clone()
                .unwrap_or_else(|| self.settings.default_model.clone()),
            agent,
            task: task.to_string(),
            prompt: String::new(),
            history: Vec::new(),
            extractor: ToolCallExtractor::default(),
            iteration: 0,
            response: String::new(),
            calls: Vec::new(),
            outcomes: Vec::new(),
            escalated: false,
            synthesized: false,
            phases: vec![ExecutionPhase::Started],
            prompt_metadata: PromptMetadata::default(),
        };

        info!(
            execution_id = %run.id,
            agent = agent_name,
            model = %run.model,
            "Agent execution started"
        );
        self.event_bus.publish(DomainEvent::ExecutionStarted {
            execution_id: run.id.clone(),
            agent: agent_name.to_string(),
            task_preview: preview(task),
            timestamp: Utc::now(),
        });

        let outcome = self.drive(&mut run, context).await;

        match outcome {
            Ok(answer) => {
                info!(
                    execution_id = %run.id,
                    agent = agent_name,
                    iterations = run.iteration,
                    tool_calls = run.outcomes.len(),
                    "Agent execution completed"
                );
                self.event_bus.publish(DomainEvent::ExecutionCompleted {
                    execution_id: run.id.clone(),
                    agent: agent_name.to_string(),
                    iterations: run.iteration,
                    tool_calls: run.outcomes.len(),
                    timestamp: Utc::now(),
                });
                self.cleanup(agent_name).await;
                Ok(ExecutionResult {
                    execution_id: run.id,
                    agent: agent_name.to_string(),
                    answer,
                    iterations: run.iteration,
                    tool_results: run.outcomes,
                    escalated: run.escalated,
                    synthesized: run.synthesized,
                    phases: run.phases,
                    prompt: run.prompt_metadata,
                })
            }
            Err(e) => {
                warn!(execution_id = %run.id, agent = agent_name, error = %e, "Agent execution failed");
                let record = self
                    .memory
                    .add_memory_entry(
                        agent_name,
                        MemoryRole::Thought,
                        &format!("Error in agent execution: {e}"),
                        metadata(json!({"error": e.to_string(), "task": task})),
                    )
                    .await;
                if let Err(record_err) = record {
                    warn!(agent = agent_name, error = %record_err, "Failed to record execution error");
                }
                self.event_bus.publish(DomainEvent::ExecutionFailed {
                    execution_id: run.id.clone(),
                    agent: agent_name.to_string(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                self.cleanup(agent_name).await;
                Err(e)
            }
        }
    }

    async fn drive(&self, run: &mut Run, context: &ExecutionContext) -> Result<String> {
        let name = run.agent.name.clone();
        let filtered = self.filter.filter(&name, &run.task, context);

        self.memory
            .add_memory_entry(
                &name,
                MemoryRole::User,
                &run.task,
                metadata(json!({"context": filtered})),
            )
            .await?;

        let entries = self.memory.get_agent_memory(&name, self.settings.memory_window).await?;
        run.history = history_from(&entries);

        let available_tools = self.available_tools(&run.agent).await?;
        let built = self.prompts.build(&PromptInput {
            agent: &run.agent,
            task: &run.task,
            context: &filtered,
            available_tools: &available_tools,
        });
        run.prompt = built.text;
        run.prompt_metadata = built.metadata;

        let catalogue = self.memory.list_tools().await?;
        run.extractor = ToolCallExtractor::from_definitions(&catalogue);

        let max_iterations = self.settings.effective_iterations();
        let mut step = Step::Generate;
        loop {
            run.phases.push(step.phase());
            step = match step {
                Step::Generate if run.iteration >= max_iterations => {
                    warn!(agent = %name, max_iterations, "Iteration limit reached");
                    Step::Complete
                }
                Step::Generate => self.generate(run).await?,
                Step::Escalate => self.escalate(run).await?,
                Step::ExecuteTools => self.execute_tools(run).await?,
                Step::RequestFinal => self.request_final(run).await?,
                Step::Complete => return Ok(std::mem::take(&mut run.response)),
            };
        }
    }

    /// Names of the agent's tools that exist in the catalogue and are enabled.
    async fn available_tools(&self, agent: &AgentDefinition) -> Result<Vec<String>> {
        let mut available = Vec::new();
        for tool_name in &agent.tools {
            match self.memory.get_tool(tool_name).await? {
                Some(def) if def.enabled => available.push(tool_name.clone()),
                _ => debug!(agent = %agent.name, tool = %tool_name, "Declared tool unavailable"),
            }
        }
        Ok(available)
    }

    async fn generate(&self, run: &mut Run) -> Result<Step> {
        run.iteration += 1;
        let name = run.agent.name.clone();

        if run.iteration == 1
            && run
                .history
                .last()
                .is_none_or(|last| last.content != run.task)
        {
            run.history.push(Message::user(&run.task));
        }

        let response = self
            .generator
            .generate_response(&run.prompt, &run.model, &run.history)
            .await?;
        debug!(agent = %name, iteration = run.iteration, chars = response.len(), "Response generated");

        self.memory
            .add_memory_entry(
                &name,
                MemoryRole::Assistant,
                &response,
                metadata(json!({"iteration": run.iteration, "task": run.task})),
            )
            .await?;
        self.event_bus.publish(DomainEvent::ResponseGenerated {
            execution_id: run.id.clone(),
            agent: name.clone(),
            iteration: run.iteration,
            chars: response.chars().count(),
            timestamp: Utc::now(),
        });

        run.calls = run.extractor.extract(&response);
        run.response = response;

        Ok(if !run.calls.is_empty() {
            Step::ExecuteTools
        } else if !run.agent.has_tools() {
            Step::Complete
        } else if run.iteration == 1 {
            Step::Escalate
        } else {
            Step::Complete
        })
    }

    async fn escalate(&self, run: &mut Run) -> Result<Step> {
        let name = run.agent.name.clone();
        let plan = Escalation::plan(&run.agent, &run.task);
        info!(agent = %name, kind = ?plan.kind, "No tool calls found, re-prompting for one");

        run.history.push(Message::assistant(&run.response));
        run.history.push(Message::user(plan.instruction()));

        let forced = self.generate_with_messages(&run.prompt, &run.model, &run.history).await?;
        run.escalated = true;

        let mut calls = run.extractor.extract(&forced);
        if calls.is_empty()
            && let Some(call) = plan.fallback_call()
        {
            info!(agent = %name, call = %call, "Model ignored the instruction, using a synthesized call");
            calls.push(call);
            run.synthesized = true;
        }

        self.memory
            .add_memory_entry(
                &name,
                MemoryRole::Assistant,
                &forced,
                metadata(json!({"iteration": "1-forced", "task": run.task, "forced": true})),
            )
            .await?;
        self.event_bus.publish(DomainEvent::Escalated {
            execution_id: run.id.clone(),
            agent: name,
            synthesized: run.synthesized,
            timestamp: Utc::now(),
        });

        run.response = forced;
        run.calls = calls;
        Ok(if run.calls.is_empty() {
            Step::Complete
        } else {
            Step::ExecuteTools
        })
    }

    async fn execute_tools(&self, run: &mut Run) -> Result<Step> {
        let name = run.agent.name.clone();
        let calls = std::mem::take(&mut run.calls);
        let mut batch = Vec::with_capacity(calls.len());

        for call in &calls {
            let started = Instant::now();
            let result = self
                .tools
                .execute_tool(&call.tool_name, &call.parameters, Some(&name))
                .await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let (outcome, content) = match result {
                Ok(result) => {
                    let content = format!("Tool: {}\nResult: {}", call.tool_name, display_value(&result));
                    (
                        ToolOutcome::Success {
                            tool: call.tool_name.clone(),
                            result,
                        },
                        content,
                    )
                }
                Err(e) => {
                    warn!(agent = %name, tool = %call.tool_name, error = %e, "Tool execution failed");
                    (
                        ToolOutcome::Failure {
                            tool: call.tool_name.clone(),
                            error: e.to_string(),
                        },
                        format!("Tool: {}\nError: {e}", call.tool_name),
                    )
                }
            };

            self.memory
                .add_memory_entry(
                    &name,
                    MemoryRole::ToolOutput,
                    &content,
                    metadata(json!({
                        "tool_name": call.tool_name,
                        "parameters": call.parameters,
                        "iteration": run.iteration,
                        "success": outcome.is_success(),
                    })),
                )
                .await?;
            self.event_bus.publish(DomainEvent::ToolExecuted {
                execution_id: run.id.clone(),
                tool_name: call.tool_name.clone(),
                success: outcome.is_success(),
                duration_ms,
                timestamp: Utc::now(),
            });
            batch.push(outcome);
        }

        run.history.push(Message::assistant(&run.response));
        run.history
            .extend(batch.iter().map(|outcome| Message::user(outcome.observation())));
        run.outcomes.extend(batch);
        Ok(Step::RequestFinal)
    }

    async fn request_final(&self, run: &mut Run) -> Result<Step> {
        let name = run.agent.name.clone();
        run.history.push(Message::user(FINAL_ANSWER_INSTRUCTION));

        let answer = self.generate_with_messages(&run.prompt, &run.model, &run.history).await?;
        self.memory
            .add_memory_entry(
                &name,
                MemoryRole::Assistant,
                &answer,
                metadata(json!({"iteration": format!("{}-final", run.iteration), "task": run.task})),
            )
            .await?;

        run.response = answer;
        Ok(Step::Complete)
    }

    /// Generate from an explicit turn list with the prompt as system message.
    ///
    /// Goes through the backend directly when the model resolves to a known
    /// provider; otherwise replays the last turn through `generate_response`.
    async fn generate_with_messages(&self, prompt: &str, model: &str, history: &[Message]) -> Result<String> {
        let (provider_id, concrete_model) = self.generator.resolve_model(model);

        if let Some(provider) = self.generator.provider(&provider_id) {
            let mut messages = Vec::with_capacity(history.len() + 1);
            messages.push(Message::system(prompt));
            messages.extend_from_slice(history);
            let config = GenerationConfig {
                temperature: self.settings.temperature,
                max_tokens: None,
                stream: false,
            };
            let response = provider.generate(&messages, &concrete_model, &config).await?;
            return Ok(response.content);
        }

        debug!(provider = %provider_id, "No direct provider, replaying last turn");
        let reply = match history.split_last() {
            Some((last, earlier)) => self.generator.generate_response(&last.content, model, earlier).await?,
            None => self.generator.generate_response(prompt, model, &[]).await?,
        };
        Ok(reply)
    }

    async fn cleanup(&self, agent_name: &str) {
        match self
            .memory
            .cleanup_agent_memory(agent_name, self.settings.memory_window)
            .await
        {
            Ok(removed) => {
                debug!(agent = agent_name, removed, "Agent memory pruned");
                self.event_bus.publish(DomainEvent::MemoryPruned {
                    agent: agent_name.to_string(),
                    removed,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => warn!(agent = agent_name, error = %e, "Agent memory cleanup failed"),
        }
    }
}
