//! Agent definitions and the per-invocation execution context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Arbitrary key/value context supplied with one execution call.
///
/// Insertion order is preserved, which the context filter and prompt
/// builder rely on for stable rendering.
pub type ExecutionContext = serde_json::Map<String, serde_json::Value>;

/// A named persona the execution loop can run.
///
/// Owned and persisted by the memory collaborator; the loop only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,

    pub role: String,

    #[serde(default)]
    pub goals: String,

    /// Behavioral rules for the agent. Rendered verbatim into the prompt.
    #[serde(default)]
    pub backstory: String,

    /// Tool names in declaration order
    #[serde(default)]
    pub tools: Vec<String>,

    /// Model identifier, optionally `provider:model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Per-tool settings handed to the tool on execution
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tool_configs: HashMap<String, serde_json::Value>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl AgentDefinition {
    /// Create an enabled agent with no tools.
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            goals: String::new(),
            backstory: String::new(),
            tools: Vec::new(),
            model: None,
            enabled: true,
            tool_configs: HashMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_goals(mut self, goals: impl Into<String>) -> Self {
        self.goals = goals.into();
        self
    }

    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = backstory.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    pub fn declares_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t == name)
    }
}
