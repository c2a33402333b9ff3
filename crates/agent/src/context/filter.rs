//! Per-agent execution context filtering.
//!
//! A caller may hand an execution a context with dozens of keys, some of
//! them raw API dumps. Each agent only sees the subset its rule set allows,
//! and nothing oversized ever reaches a prompt.
//!
//! # Paths
//!
//! | Context size | Behavior |
//! |--------------|----------|
//! | ≤ 5 entries  | Everything except oversized entries |
//! | > 5 entries  | Include/exclude rules for the agent, then oversized check |
//!
//! If the rule-based path empties a non-empty context, a fallback keeps up
//! to three small identifying entries so the agent always gets *something*.

use serde_json::Value;
use std::collections::HashMap;
use toolmark_config::ContextConfig;
use toolmark_core::ExecutionContext;
use tracing::{debug, info};

/// Contexts with at most this many entries skip the rule sets.
pub const SMALL_CONTEXT_LIMIT: usize = 5;

const MAX_STRING_CHARS: usize = 10_000;
const MAX_JSON_CHARS: usize = 20_000;
const MAX_SEQUENCE_LEN: usize = 100;
const HUGE_KEY_MARKERS: [&str; 5] = [
    "raw_api_response",
    "full_raw_data",
    "_response_content",
    "api_data",
    "files",
];

const FALLBACK_LIMIT: usize = 3;
const FALLBACK_STRING_CHARS: usize = 500;

// ── Rules ─────────────────────────────────────────────────────────────────

/// An include/exclude pattern set.
///
/// Patterns: `"*"` matches everything, `prefix*` matches by prefix,
/// `*suffix` matches by suffix, anything else by equality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextRule {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl ContextRule {
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    /// True when `key` matches an include pattern and no exclude pattern.
    pub fn allows(&self, key: &str) -> bool {
        let included = self.include.iter().any(|p| pattern_matches(p, key));
        let excluded = self.exclude.iter().any(|p| pattern_matches(p, key));
        included && !excluded
    }
}

fn pattern_matches(pattern: &str, key: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        key.starts_with(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        key.ends_with(suffix)
    } else {
        key == pattern
    }
}

fn builtin_rules() -> HashMap<String, ContextRule> {
    HashMap::from([
        (
            "purl_parser".to_string(),
            ContextRule::new(
                ["purl"],
                ["raw_api_response", "package_analysis_*", "license_*"],
            ),
        ),
        (
            "license_assessor".to_string(),
            ContextRule::new(
                [
                    "purl",
                    "package_metadata",
                    "license_data",
                    "package_analysis_metadata",
                    "package_analysis_licensed",
                ],
                ["raw_api_response"],
            ),
        ),
        (
            "security_analyzer".to_string(),
            ContextRule::new(
                ["purl", "package_metadata", "license_data", "vulnerability_*"],
                ["raw_api_response"],
            ),
        ),
        (
            "data_extractor".to_string(),
            ContextRule::new(["*"], Vec::<String>::new()),
        ),
    ])
}

// ── Oversized detection ───────────────────────────────────────────────────

/// Whether a context entry is too large to put in front of a model.
///
/// Never fails: a value that cannot be measured counts as small.
pub fn is_oversized(key: &str, value: &Value) -> bool {
    let too_big = match value {
        Value::String(s) => s.chars().count() > MAX_STRING_CHARS,
        Value::Array(items) if items.len() > MAX_SEQUENCE_LEN => true,
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value)
            .map(|json| json.chars().count() > MAX_JSON_CHARS)
            .unwrap_or(false),
        _ => false,
    };
    if too_big {
        return true;
    }

    let key = key.to_lowercase();
    HUGE_KEY_MARKERS.iter().any(|marker| key.contains(marker))
}

// ── Filter ────────────────────────────────────────────────────────────────

/// Reduces an execution context to what one agent should see.
#[derive(Debug, Clone)]
pub struct ContextFilter {
    rules: HashMap<String, ContextRule>,
    default_rule: ContextRule,
    task_key: String,
}

impl ContextFilter {
    /// A filter with the built-in rule sets and `purl` as the task key.
    pub fn new() -> Self {
        Self {
            rules: builtin_rules(),
            default_rule: ContextRule::new(Vec::<String>::new(), ["raw_api_response", "*_raw_data"]),
            task_key: "purl".into(),
        }
    }

    /// Built-in rule sets overlaid with the configured ones.
    pub fn from_config(config: &ContextConfig) -> Self {
        let mut filter = Self::new().with_task_key(config.task_key.clone());
        for (agent, rule) in &config.rules {
            filter = filter.with_rule(
                agent.clone(),
                ContextRule::new(rule.include.clone(), rule.exclude.clone()),
            );
        }
        filter
    }

    pub fn with_rule(mut self, agent_name: impl Into<String>, rule: ContextRule) -> Self {
        self.rules.insert(agent_name.into(), rule);
        self
    }

    pub fn with_task_key(mut self, key: impl Into<String>) -> Self {
        self.task_key = key.into();
        self
    }

    pub fn task_key(&self) -> &str {
        &self.task_key
    }

    /// The rule set applied to `agent_name` on the rule-based path.
    pub fn rule_for(&self, agent_name: &str) -> &ContextRule {
        self.rules.get(agent_name).unwrap_or(&self.default_rule)
    }

    /// Filter `full_context` for `agent_name`. Entry order is preserved.
    pub fn filter(&self, agent_name: &str, task: &str, full_context: &ExecutionContext) -> ExecutionContext {
        if full_context.len() <= SMALL_CONTEXT_LIMIT {
            return full_context
                .iter()
                .filter(|(key, value)| {
                    let oversized = is_oversized(key, value);
                    if oversized {
                        info!(agent = agent_name, key = %key, "Dropping oversized context entry");
                    }
                    !oversized
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }

        let rule = self.rule_for(agent_name);
        let mut filtered = ExecutionContext::new();
        for (key, value) in full_context {
            if !rule.allows(key) {
                debug!(agent = agent_name, key = %key, "Context entry not allowed by rules");
                continue;
            }
            if is_oversized(key, value) {
                info!(agent = agent_name, key = %key, "Dropping oversized context entry");
                continue;
            }
            filtered.insert(key.clone(), value.clone());
        }

        if filtered.is_empty() && !full_context.is_empty() {
            filtered = self.minimal_context(full_context);
        }

        info!(
            agent = agent_name,
            task_chars = task.len(),
            before = full_context.len(),
            after = filtered.len(),
            "Context filtered"
        );
        filtered
    }

    /// Up to three small entries, the task key first when present.
    fn minimal_context(&self, full_context: &ExecutionContext) -> ExecutionContext {
        let mut minimal = ExecutionContext::new();
        if let Some(value) = full_context.get(&self.task_key) {
            minimal.insert(self.task_key.clone(), value.clone());
        }
        for (key, value) in full_context {
            if minimal.len() >= FALLBACK_LIMIT {
                break;
            }
            let short_string = value
                .as_str()
                .is_some_and(|s| s.chars().count() < FALLBACK_STRING_CHARS);
            if short_string && !minimal.contains_key(key) {
                minimal.insert(key.clone(), value.clone());
            }
        }
        minimal
    }
}

impl Default for ContextFilter {
    fn default() -> Self {
        Self::new()
    }
}
