//! Re-prompting when an agent with tools named none.
//!
//! The task text is classified by keyword. A branch applies only when the
//! agent declares the matching tool; otherwise classification falls
//! through to the next one.

use regex::Regex;
use std::sync::LazyLock;
use toolmark_core::{AgentDefinition, ToolCall};

use crate::extract::WEBSITE_CHECK_TOOL;

/// The generic HTTP tool targeted by request-shaped tasks.
pub const HTTP_TOOL: &str = "http_client";

const WEBSITE_KEYWORDS: [&str; 5] = ["check", "http", "url", "website", "status"];
const HTTP_KEYWORDS: [&str; 4] = ["api", "request", "get", "post"];

const DEFAULT_WEBSITE_URL: &str = "https://google.com";
const DEFAULT_HTTP_URL: &str = "https://httpbin.org/get";

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s]+").unwrap());

/// What kind of tool use the task looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    WebsiteCheck,
    HttpRequest,
    Generic,
}

/// The re-prompt plan for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub kind: TaskKind,
    /// The URL to check or request; `None` for generic tasks.
    pub url: Option<String>,
    tools: Vec<String>,
    task: String,
}

impl Escalation {
    pub fn plan(agent: &AgentDefinition, task: &str) -> Self {
        let lower = task.to_lowercase();
        let mentions = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

        let (kind, url) = if agent.declares_tool(WEBSITE_CHECK_TOOL) && mentions(&WEBSITE_KEYWORDS) {
            (
                TaskKind::WebsiteCheck,
                Some(extract_url(task).unwrap_or_else(|| DEFAULT_WEBSITE_URL.to_string())),
            )
        } else if agent.declares_tool(HTTP_TOOL) && mentions(&HTTP_KEYWORDS) {
            (
                TaskKind::HttpRequest,
                Some(extract_url(task).unwrap_or_else(|| DEFAULT_HTTP_URL.to_string())),
            )
        } else {
            (TaskKind::Generic, None)
        };

        Self {
            kind,
            url,
            tools: agent.tools.clone(),
            task: task.to_string(),
        }
    }

    /// The user turn sent to the model.
    pub fn instruction(&self) -> String {
        let url = self.url.as_deref().unwrap_or_default();
        match self.kind {
            TaskKind::WebsiteCheck => format!(
                "You MUST use the {WEBSITE_CHECK_TOOL} tool to complete this task.\n\n\
                 Respond with EXACTLY this format (no extra text):\n\
                 TOOL_CALL: {WEBSITE_CHECK_TOOL}(url={url}, expected_status=200)"
            ),
            TaskKind::HttpRequest => format!(
                "You MUST use the {HTTP_TOOL} tool to complete this task.\n\n\
                 Respond with EXACTLY this format (no extra text):\n\
                 TOOL_CALL: {HTTP_TOOL}(url={url}, method=GET)"
            ),
            TaskKind::Generic => format!(
                "You have these tools available: {}\n\n\
                 You MUST use one of these tools. Respond with EXACTLY this format:\n\
                 TOOL_CALL: tool_name(parameter=value)\n\n\
                 For website checking: TOOL_CALL: website_monitor(url=https://example.com, expected_status=200)\n\
                 For HTTP requests: TOOL_CALL: http_client(url=https://api.example.com, method=GET)\n\n\
                 Use the appropriate tool for: \"{}\"",
                self.tools.join(", "),
                self.task
            ),
        }
    }

    /// The call to run when the model ignores the instruction too.
    pub fn fallback_call(&self) -> Option<ToolCall> {
        let url = self.url.clone()?;
        match self.kind {
            TaskKind::WebsiteCheck => Some(
                ToolCall::new(WEBSITE_CHECK_TOOL)
                    .with_param("url", url)
                    .with_param("expected_status", 200),
            ),
            TaskKind::HttpRequest => Some(
                ToolCall::new(HTTP_TOOL)
                    .with_param("url", url)
                    .with_param("method", "GET"),
            ),
            TaskKind::Generic => None,
        }
    }
}

/// The first `http(s)://` URL in `text`, minus trailing sentence punctuation.
pub fn extract_url(text: &str) -> Option<String> {
    let found = URL.find(text)?.as_str();
    let trimmed = found.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}', '\'', '"']);
    (!trimmed.ends_with("://")).then(|| trimmed.to_string())
}
