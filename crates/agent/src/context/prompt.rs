//! System prompt assembly.
//!
//! Renders one text prompt from seven ordered sections, each present only
//! when its data exists:
//!
//! 1. **Identity**: `You are {name}: {role}`
//! 2. **Goals**
//! 3. **Background and rules**: the backstory, verbatim
//! 4. **Current task**
//! 5. **Execution context**: filtered entries, summarized and truncated
//! 6. **Tools**: catalogue plus the `TOOL_CALL:` format contract
//! 7. **Closing instruction**
//!
//! Building never fails. Per-entry caps and a total context budget keep
//! the prompt bounded no matter how large the context is.

use serde::Serialize;
use serde_json::Value;
use toolmark_core::{AgentDefinition, ExecutionContext};
use tracing::{debug, warn};

const STRUCTURED_PREVIEW_CHARS: usize = 2000;
const SUMMARY_MAX_FIELDS: usize = 10;
const SUMMARY_SHORT_STRING_CHARS: usize = 100;
const SCALAR_MAX_CHARS: usize = 1000;
const CONTEXT_BUDGET_CHARS: usize = 5000;
const LARGE_PROMPT_CHARS: usize = 15_000;

const TOOL_FORMAT_CONTRACT: &str = "
IMPORTANT: To use a tool, use this exact format:
TOOL_CALL: tool_name(parameter=value)

Examples:
- TOOL_CALL: website_monitor(url=https://google.com, expected_status=200)
- TOOL_CALL: http_client(url=https://api.example.com, method=GET)

If the task requires checking a website or URL, you MUST use the website_monitor tool.
If the task requires making HTTP requests, you MUST use the http_client tool.";

const NO_TOOLS_NOTICE: &str =
    "\nYou have no tools available. Respond directly using your knowledge and the rules provided.";

const CLOSING_INSTRUCTION: &str = "
Follow the rules and formats specified in your background. Be precise and accurate.
If you need to return structured data (like JSON), format it correctly.";

// ── Types ─────────────────────────────────────────────────────────────────

/// Everything the builder needs for one prompt.
pub struct PromptInput<'a> {
    pub agent: &'a AgentDefinition,
    pub task: &'a str,
    /// Already filtered for this agent.
    pub context: &'a ExecutionContext,
    /// Names of the agent's tools that are registered and enabled.
    /// Listed as `None` when the agent declares tools but none qualify.
    pub available_tools: &'a [String],
}

/// A rendered prompt and what went into it.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub text: String,
    pub metadata: PromptMetadata,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptMetadata {
    pub chars: usize,
    /// Rough size at ~4 characters per token.
    pub estimated_tokens: usize,
    pub context_entries_rendered: usize,
    pub context_truncated: bool,
    pub tools_listed: usize,
}

// ── Builder ───────────────────────────────────────────────────────────────

/// Stateless; create one and reuse it.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, input: &PromptInput<'_>) -> BuiltPrompt {
        let agent = input.agent;
        let mut metadata = PromptMetadata::default();
        let mut parts = vec![format!("You are {}: {}", agent.name, agent.role)];

        if !agent.goals.is_empty() {
            parts.push(format!("\nYour Goals:\n{}", agent.goals));
        }
        if !agent.backstory.is_empty() {
            parts.push(format!("\nYour Background and Rules:\n{}", agent.backstory));
        }
        parts.push(format!("\nCurrent Task: {}", input.task));

        let rendered = render_context(input.context);
        if !rendered.text.is_empty() {
            parts.push(format!("\nExecution Context:{}", rendered.text));
        }
        metadata.context_entries_rendered = rendered.entries;
        metadata.context_truncated = rendered.truncated;

        // Declared tools keep the format contract even when none is enabled.
        if agent.has_tools() {
            let listed = if input.available_tools.is_empty() {
                "None".to_string()
            } else {
                input.available_tools.join(", ")
            };
            parts.push(format!("\nAvailable Tools: {listed}"));
            parts.push(TOOL_FORMAT_CONTRACT.to_string());
        } else {
            parts.push(NO_TOOLS_NOTICE.to_string());
        }
        metadata.tools_listed = input.available_tools.len();

        parts.push(CLOSING_INSTRUCTION.to_string());

        let text = parts.join("\n");
        metadata.chars = text.chars().count();
        metadata.estimated_tokens = metadata.chars.div_ceil(4);

        debug!(agent = %agent.name, chars = metadata.chars, "System prompt built");
        if metadata.chars > LARGE_PROMPT_CHARS {
            warn!(agent = %agent.name, chars = metadata.chars, "Large system prompt");
        }

        BuiltPrompt { text, metadata }
    }
}

// ── Context rendering ─────────────────────────────────────────────────────

struct RenderedContext {
    text: String,
    entries: usize,
    truncated: bool,
}

fn render_context(context: &ExecutionContext) -> RenderedContext {
    let mut text = String::new();
    let mut entries = 0;
    let mut truncated = false;

    for (key, value) in context {
        text.push_str(&render_entry(key, value));
        entries += 1;

        if text.chars().count() > CONTEXT_BUDGET_CHARS {
            text.push_str("\n... [additional context truncated for brevity]");
            truncated = true;
            break;
        }
    }

    RenderedContext {
        text,
        entries,
        truncated,
    }
}

/// The pretty-printed form, if it is short enough to show whole.
fn short_pretty(value: &Value) -> Option<String> {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    (pretty.chars().count() <= STRUCTURED_PREVIEW_CHARS).then_some(pretty)
}

fn render_entry(key: &str, value: &Value) -> String {
    match value {
        Value::Object(map) => match short_pretty(value) {
            Some(pretty) => format!("\n- {key}: {pretty}"),
            None => {
                let lines: Vec<String> = map
                    .iter()
                    .take(SUMMARY_MAX_FIELDS)
                    .map(|(k, v)| format!("  {k}: {}", summarize_field(v)))
                    .collect();
                format!("\n- {key} (summary):\n{}", lines.join("\n"))
            }
        },
        Value::Array(items) => match short_pretty(value) {
            Some(pretty) => format!("\n- {key}: {pretty}"),
            None => format!("\n- {key}: <large array with {} items>", items.len()),
        },
        scalar => {
            let text = toolmark_core::tool::display_value(scalar);
            if text.chars().count() > SCALAR_MAX_CHARS {
                let head: String = text.chars().take(SCALAR_MAX_CHARS).collect();
                format!("\n- {key}: {head}... [truncated]")
            } else {
                format!("\n- {key}: {text}")
            }
        }
    }
}

fn summarize_field(value: &Value) -> String {
    match value {
        Value::String(s) if s.chars().count() < SUMMARY_SHORT_STRING_CHARS => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => format!("<{}>", json_type(other)),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
