//! Tool traits and the text-extracted tool call.
//!
//! Models request tools by writing `TOOL_CALL: name(key=value, ...)` into
//! their reply. The extractor in `toolmark-agent` turns that text into a
//! [`ToolCall`]; the [`ToolExecutor`] collaborator runs it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::ToolError;

/// Parameters of a tool call, in the order the model wrote them.
pub type ToolParameters = serde_json::Map<String, serde_json::Value>;

/// A structured tool invocation recovered from model text.
///
/// Equality is structural over `(tool_name, parameters)` and ignores
/// parameter order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub parameters: ToolParameters,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters: ToolParameters::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Render in the textual wire format the extractor understands.
    ///
    /// Strings are written bare when that reads back unchanged, otherwise
    /// double-quoted. Structured values are written as compact JSON.
    pub fn render(&self) -> String {
        let args = self
            .parameters
            .iter()
            .map(|(k, v)| format!("{k}={}", render_value(v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("TOOL_CALL: {}({args})", self.tool_name)
    }
}

impl fmt::Display for ToolCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => {
            let bare_safe = !s.is_empty()
                && s.trim() == s
                && !s.contains([',', '"', '\'', '{', '}', '[', ']', '(', ')'])
                && !s.chars().all(|c| c.is_ascii_digit())
                && !s.eq_ignore_ascii_case("true")
                && !s.eq_ignore_ascii_case("false");
            if bare_safe {
                s.clone()
            } else {
                format!("\"{s}\"")
            }
        }
        other => other.to_string(),
    }
}

/// The outcome of one tool invocation: a result or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutcome {
    Success {
        tool: String,
        result: serde_json::Value,
    },
    Failure {
        tool: String,
        error: String,
    },
}

impl ToolOutcome {
    pub fn tool(&self) -> &str {
        match self {
            ToolOutcome::Success { tool, .. } | ToolOutcome::Failure { tool, .. } => tool,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    /// The observation turn fed back to the model.
    pub fn observation(&self) -> String {
        match self {
            ToolOutcome::Success { tool, result } => {
                format!("Tool {tool} result: {}", display_value(result))
            }
            ToolOutcome::Failure { tool, error } => format!("Tool {tool} failed: {error}"),
        }
    }
}

/// Strings print without JSON quotes; everything else as compact JSON.
pub fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A catalogue entry describing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The core Tool trait.
///
/// Each tool implements this trait and is registered in a [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "website_monitor").
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool. `config` is the calling agent's per-tool setting
    /// (`Value::Null` when it has none).
    async fn execute(
        &self,
        parameters: &ToolParameters,
        config: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a catalogue entry.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            enabled: true,
        }
    }
}

/// The tool-execution collaborator used by the execution loop.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute_tool(
        &self,
        tool_name: &str,
        parameters: &ToolParameters,
        caller: Option<&str>,
    ) -> std::result::Result<serde_json::Value, ToolError>;
}

/// A registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All catalogue entries, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
