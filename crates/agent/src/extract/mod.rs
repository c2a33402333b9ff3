//! Tool-call extraction from free-form model text.
//!
//! Models announce tool use with `TOOL_CALL: name(key=value, ...)`. The
//! extractor finds those markers, validates the tool name against a
//! catalogue snapshot, parses and normalizes the arguments, and drops
//! duplicates. It is a pure function of the text: nothing here touches
//! memory, the network, or the model.
//!
//! # Patterns
//!
//! | Pass | Pattern | Accepts |
//! |------|---------|---------|
//! | Primary | `TOOL_CALL:` | every valid call |
//! | Fallback 1 | `TOOL_CALL` without colon | first valid call only |
//! | Fallback 2 | `tool call`, `toolcall`, optional colon | first valid call only |
//!
//! Fallbacks run only when the primary pass accepted nothing, and stop as
//! soon as one of them accepts a call.

pub mod params;

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;
use toolmark_core::tool::{ToolCall, ToolDefinition, display_value};
use tracing::{debug, info};

pub use params::{MalformedNesting, coerce_value, parse_parameters, split_arguments};

/// The tool whose `url` argument gets hostname normalization.
pub const WEBSITE_CHECK_TOOL: &str = "website_monitor";

/// Identifiers a model writes when it echoes the format template.
const PLACEHOLDER_NAMES: [&str; 3] = ["tool_name", "tool", "name"];

static PRIMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)TOOL_CALL:\s*([a-z_][a-z0-9_]*)\s*\((.*?)\)").unwrap()
});

static FALLBACKS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?is)TOOL_CALL\s+([a-z_][a-z0-9_]*)\s*\((.*?)\)").unwrap(),
        Regex::new(r"(?is)tool[_ ]?call\s*:?\s*([a-z_][a-z0-9_]*)\s*\((.*?)\)").unwrap(),
    ]
});

// ── Candidates ────────────────────────────────────────────────────────────

/// Why a marker in the text did not become a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The model echoed a template word such as `tool_name`
    Placeholder,
    /// Not in the tool catalogue
    UnknownTool,
    /// A website check whose URL is the tool's own name
    SelfReferentialUrl,
    /// Same tool and parameters as a call already accepted
    Duplicate,
    /// Unbalanced braces or brackets in the argument list
    MalformedArguments,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rejection::Placeholder => "placeholder tool name",
            Rejection::UnknownTool => "unknown tool",
            Rejection::SelfReferentialUrl => "url is the tool name",
            Rejection::Duplicate => "duplicate call",
            Rejection::MalformedArguments => "malformed arguments",
        };
        f.write_str(text)
    }
}

/// One `TOOL_CALL` marker found in the text, accepted or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Candidate {
    Accepted(ToolCall),
    Rejected { tool_name: String, reason: Rejection },
}

impl Candidate {
    pub fn accepted(&self) -> Option<&ToolCall> {
        match self {
            Candidate::Accepted(call) => Some(call),
            Candidate::Rejected { .. } => None,
        }
    }
}

// ── Extractor ─────────────────────────────────────────────────────────────

/// Extracts tool calls, validating names against a catalogue snapshot.
#[derive(Debug, Clone, Default)]
pub struct ToolCallExtractor {
    catalogue: HashSet<String>,
}

impl ToolCallExtractor {
    pub fn new<I, S>(tool_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            catalogue: tool_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_definitions(definitions: &[ToolDefinition]) -> Self {
        Self::new(definitions.iter().map(|d| d.name.clone()))
    }

    pub fn knows(&self, tool_name: &str) -> bool {
        self.catalogue.contains(tool_name)
    }

    /// The accepted calls, in first-seen order.
    pub fn extract(&self, text: &str) -> Vec<ToolCall> {
        let calls: Vec<ToolCall> = self
            .scan(text)
            .into_iter()
            .filter_map(|candidate| match candidate {
                Candidate::Accepted(call) => Some(call),
                Candidate::Rejected { .. } => None,
            })
            .collect();
        info!(count = calls.len(), "Tool calls extracted");
        calls
    }

    /// Every marker considered, accepted or rejected, in the order seen.
    ///
    /// A marker is considered once: fallback matches overlapping text an
    /// earlier pass already looked at are skipped.
    pub fn scan(&self, text: &str) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        let mut accepted: Vec<ToolCall> = Vec::new();
        let mut seen: Vec<Range<usize>> = Vec::new();

        for caps in PRIMARY.captures_iter(text) {
            if let Some(span) = caps.get(0) {
                seen.push(span.range());
            }
            let candidate = self.evaluate(&caps[1], &caps[2], &accepted);
            if let Candidate::Accepted(call) = &candidate {
                accepted.push(call.clone());
            }
            candidates.push(candidate);
        }
        if !accepted.is_empty() {
            return candidates;
        }

        debug!("No primary tool call markers accepted, trying fallback patterns");
        for pattern in FALLBACKS.iter() {
            for caps in pattern.captures_iter(text) {
                let Some(span) = caps.get(0).map(|m| m.range()) else {
                    continue;
                };
                if seen.iter().any(|prior| overlaps(prior, &span)) {
                    continue;
                }
                seen.push(span);

                let candidate = self.evaluate(&caps[1], &caps[2], &accepted);
                let hit = matches!(candidate, Candidate::Accepted(_));
                if let Candidate::Accepted(call) = &candidate {
                    accepted.push(call.clone());
                }
                candidates.push(candidate);
                if hit {
                    break;
                }
            }
            if !accepted.is_empty() {
                break;
            }
        }
        candidates
    }

    fn evaluate(&self, tool_name: &str, raw_args: &str, accepted: &[ToolCall]) -> Candidate {
        let tool_name = tool_name.trim();
        let reject = |reason: Rejection| {
            debug!(tool = tool_name, %reason, "Tool call candidate rejected");
            Candidate::Rejected {
                tool_name: tool_name.to_string(),
                reason,
            }
        };

        if PLACEHOLDER_NAMES.contains(&tool_name.to_lowercase().as_str()) {
            return reject(Rejection::Placeholder);
        }
        if !self.knows(tool_name) {
            return reject(Rejection::UnknownTool);
        }

        let mut parameters = match parse_parameters(raw_args) {
            Ok(parameters) => parameters,
            Err(_) => return reject(Rejection::MalformedArguments),
        };

        if tool_name == WEBSITE_CHECK_TOOL
            && let Some(url) = parameters.get("url")
        {
            let url = display_value(url);
            let url = url.trim().trim_matches(|c| c == '"' || c == '\'');
            if url == WEBSITE_CHECK_TOOL || url == tool_name {
                return reject(Rejection::SelfReferentialUrl);
            }
            parameters.insert("url".into(), normalize_url(url).into());
        }

        let call = ToolCall {
            tool_name: tool_name.to_string(),
            parameters,
        };
        if accepted.contains(&call) {
            return reject(Rejection::Duplicate);
        }
        Candidate::Accepted(call)
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Add `https://` to bare hostnames such as `www.example.com` or
/// `example.org/health`. Values with another scheme are left alone.
pub fn normalize_url(url: &str) -> String {
    let has_scheme = ["http://", "https://", "ftp://", "file://"]
        .iter()
        .any(|scheme| url.starts_with(scheme));
    if !has_scheme && (url.starts_with("www.") || url.contains('.')) {
        format!("https://{url}")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor() -> ToolCallExtractor {
        ToolCallExtractor::new(["website_monitor", "http_client", "rss_reader"])
    }

    #[test]
    fn extracts_in_order() {
        let text = "Let me check.\nTOOL_CALL: website_monitor(url=https://example.org, expected_status=200)\n\
                    then TOOL_CALL: http_client(url=https://api.example.com, method=GET)";
        let calls = extractor().extract(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].tool_name, "website_monitor");
        assert_eq!(calls[0].parameters["expected_status"], 200);
        assert_eq!(calls[1].parameters["method"], "GET");
    }

    #[test]
    fn marker_is_case_insensitive() {
        let calls = extractor().extract("tool_call: rss_reader(feed=https://x.io/rss)");
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn duplicates_are_suppressed() {
        let text = "TOOL_CALL: website_monitor(url=https://a.io)\nTOOL_CALL: website_monitor(url=https://a.io)";
        let scan = extractor().scan(text);
        assert_eq!(scan.len(), 2);
        assert!(matches!(scan[1], Candidate::Rejected { reason: Rejection::Duplicate, .. }));
        assert_eq!(extractor().extract(text).len(), 1);
    }

    #[test]
    fn placeholders_and_unknown_tools_are_rejected() {
        let text = "TOOL_CALL: tool_name(parameter=value)\nTOOL_CALL: Name(x=1)\nTOOL_CALL: shell(cmd=ls)";
        let reasons: Vec<_> = extractor()
            .scan(text)
            .into_iter()
            .map(|c| match c {
                Candidate::Rejected { reason, .. } => reason,
                Candidate::Accepted(call) => panic!("unexpected accept: {call}"),
            })
            .collect();
        assert_eq!(
            reasons,
            [Rejection::Placeholder, Rejection::Placeholder, Rejection::UnknownTool]
        );
    }

    #[test]
    fn rejected_markers_are_reported_once() {
        let scan = extractor().scan("TOOL_CALL: tool_name(parameter=value)\nTOOL_CALL: shell(cmd=ls)");
        assert_eq!(
            scan,
            vec![
                Candidate::Rejected {
                    tool_name: "tool_name".into(),
                    reason: Rejection::Placeholder
                },
                Candidate::Rejected {
                    tool_name: "shell".into(),
                    reason: Rejection::UnknownTool
                },
            ]
        );

        // Both fallbacks match a colon-less marker; it still counts once.
        let scan = extractor().scan("TOOL_CALL shell(cmd=ls)");
        assert_eq!(scan.len(), 1);
    }

    #[test]
    fn fallback_still_finds_calls_beside_rejected_primary_markers() {
        let text = "TOOL_CALL: shell(cmd=ls)\nthen tool call http_client(url=https://b.io)";
        let scan = extractor().scan(text);
        assert_eq!(scan.len(), 2);
        assert!(matches!(scan[0], Candidate::Rejected { reason: Rejection::UnknownTool, .. }));
        assert_eq!(scan[1].accepted().map(|c| c.tool_name.as_str()), Some("http_client"));
    }

    #[test]
    fn website_urls_are_normalized() {
        let calls = extractor().extract("TOOL_CALL: website_monitor(url=www.example.com)");
        assert_eq!(calls[0].parameters["url"], "https://www.example.com");

        let calls = extractor().extract("TOOL_CALL: website_monitor(url='example.org/health')");
        assert_eq!(calls[0].parameters["url"], "https://example.org/health");

        let calls = extractor().extract("TOOL_CALL: website_monitor(url=localhost)");
        assert_eq!(calls[0].parameters["url"], "localhost");

        assert_eq!(normalize_url("ftp://files.example.com"), "ftp://files.example.com");
    }

    #[test]
    fn self_referential_url_drops_the_call() {
        let scan = extractor().scan("TOOL_CALL: website_monitor(url=website_monitor)");
        assert_eq!(
            scan,
            vec![Candidate::Rejected {
                tool_name: "website_monitor".into(),
                reason: Rejection::SelfReferentialUrl
            }]
        );
    }

    #[test]
    fn other_tools_keep_raw_urls() {
        let calls = extractor().extract("TOOL_CALL: http_client(url=api.example.com)");
        assert_eq!(calls[0].parameters["url"], "api.example.com");
    }

    #[test]
    fn body_is_renamed_and_decoded() {
        let calls = extractor().extract(r#"TOOL_CALL: http_client(url=https://api.example.com, body={"a": 1})"#);
        assert_eq!(
            serde_json::Value::Object(calls[0].parameters.clone()),
            json!({"url": "https://api.example.com", "data": {"a": 1}})
        );
    }

    #[test]
    fn malformed_arguments_reject_the_call() {
        let scan = extractor().scan(r#"TOOL_CALL: http_client(url=https://x.io, data={"a": 1)"#);
        assert!(matches!(
            scan[0],
            Candidate::Rejected { reason: Rejection::MalformedArguments, .. }
        ));
    }

    #[test]
    fn fallback_without_colon_takes_first_call_only() {
        let text = "TOOL_CALL website_monitor(url=https://a.io)\nTOOL_CALL http_client(url=https://b.io)";
        let calls = extractor().extract(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].parameters["url"], "https://a.io");
    }

    #[test]
    fn loosest_fallback() {
        let calls = extractor().extract("I will use Tool Call: http_client(url=https://b.io, method=GET)");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "http_client");
    }

    #[test]
    fn fallbacks_skipped_when_primary_accepts() {
        let text = "TOOL_CALL: http_client(url=https://a.io)\nTOOL_CALL website_monitor(url=https://b.io)";
        let calls = extractor().extract(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "http_client");
    }

    #[test]
    fn plain_text_yields_nothing() {
        assert!(extractor().extract("The site looks fine to me.").is_empty());
        assert!(extractor().scan("").is_empty());
    }

    #[test]
    fn rendered_calls_read_back_unchanged() {
        let calls = [
            ToolCall::new("website_monitor")
                .with_param("url", "https://example.org")
                .with_param("expected_status", 200)
                .with_param("check_content", "Welcome, friend"),
            ToolCall::new("http_client")
                .with_param("url", "https://api.example.com")
                .with_param("data", json!({"a": 1, "tags": ["x", "y"]}))
                .with_param("verify_ssl", false),
            ToolCall::new("rss_reader"),
        ];
        for call in calls {
            let read_back = extractor().extract(&call.render());
            assert_eq!(read_back, vec![call.clone()], "{}", call.render());
        }
    }
}
