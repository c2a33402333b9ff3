//! Configuration loading, validation, and management for toolmark.
//!
//! Loads configuration from `~/.toolmark/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use toolmark_core::AgentDefinition;

/// The root configuration structure.
///
/// Maps directly to `~/.toolmark/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used when an agent names none
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Temperature for system-message generations
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Soft bound on loop iterations (the executor caps it at 3)
    #[serde(default = "default_max_agent_iterations")]
    pub max_agent_iterations: u32,

    /// History window and retention size per agent
    #[serde(default = "default_max_agent_memory_entries")]
    pub max_agent_memory_entries: usize,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Provider fallback chain
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Context filter rules
    #[serde(default)]
    pub context: ContextConfig,

    /// Named sliding-window limits for the tool layer
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitConfig>,

    /// Agents loaded into the memory store at startup
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "granite3.2:2b".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_agent_iterations() -> u32 {
    3
}
fn default_max_agent_memory_entries() -> usize {
    20
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("max_agent_iterations", &self.max_agent_iterations)
            .field("max_agent_memory_entries", &self.max_agent_memory_entries)
            .field("memory", &self.memory)
            .field("providers", &self.providers)
            .field("fallback", &self.fallback)
            .field("context", &self.context)
            .field("rate_limits", &self.rate_limits)
            .field("agents", &self.agents)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("models", &self.models)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "memory" (process lifetime) or "file" (JSON snapshot)
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// Snapshot path for the file backend; defaults under the config dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_memory_backend() -> String {
    "file".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: None,
        }
    }
}

impl MemoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("memory.jsonl"))
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Models this provider serves, used for name resolution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Providers tried in order after the primary fails
    #[serde(default)]
    pub providers: Vec<String>,

    #[serde(default = "default_fallback_timeout")]
    pub timeout_secs: u64,
}

fn default_fallback_timeout() -> u64 {
    60
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            providers: vec![],
            timeout_secs: default_fallback_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// The key that identifies what a task is about
    #[serde(default = "default_task_key")]
    pub task_key: String,

    /// Per-agent rule sets, layered over the built-in ones
    #[serde(default)]
    pub rules: HashMap<String, ContextRuleConfig>,
}

fn default_task_key() -> String {
    "purl".into()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            task_key: default_task_key(),
            rules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextRuleConfig {
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_window_secs() -> u64 {
    60
}

/// An agent definition as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,

    pub role: String,

    #[serde(default)]
    pub goals: String,

    #[serde(default)]
    pub backstory: String,

    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tool_configs: HashMap<String, serde_json::Value>,
}

impl AgentConfig {
    pub fn to_definition(&self) -> AgentDefinition {
        let mut agent = AgentDefinition::new(&self.name, &self.role)
            .with_goals(&self.goals)
            .with_backstory(&self.backstory)
            .with_tools(self.tools.iter().cloned());
        agent.model = self.model.clone();
        agent.enabled = self.enabled;
        agent.tool_configs = self.tool_configs.clone();
        agent
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolmark/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides:
    /// - `TOOLMARK_API_KEY`, `TOOLMARK_PROVIDER`, `TOOLMARK_MODEL`
    /// - `TOOLMARK_MAX_ITERATIONS`, `TOOLMARK_MAX_MEMORY_ENTRIES`
    /// - `OLLAMA_URL` (base URL of the `ollama` provider)
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("TOOLMARK_API_KEY");
        }
        if let Some(provider) = lookup("TOOLMARK_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("TOOLMARK_MODEL") {
            self.default_model = model;
        }
        if let Some(raw) = lookup("TOOLMARK_MAX_ITERATIONS") {
            self.max_agent_iterations = parse_env("TOOLMARK_MAX_ITERATIONS", &raw)?;
        }
        if let Some(raw) = lookup("TOOLMARK_MAX_MEMORY_ENTRIES") {
            self.max_agent_memory_entries = parse_env("TOOLMARK_MAX_MEMORY_ENTRIES", &raw)?;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.providers.entry("ollama".into()).or_default().api_url = Some(url);
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolmark")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_agent_iterations < 1 {
            return Err(ConfigError::ValidationError(
                "max_agent_iterations must be at least 1".into(),
            ));
        }

        if self.max_agent_memory_entries < 1 {
            return Err(ConfigError::ValidationError(
                "max_agent_memory_entries must be at least 1".into(),
            ));
        }

        for (name, provider) in &self.providers {
            if let Some(url) = &provider.api_url
                && !(url.starts_with("http://") || url.starts_with("https://"))
            {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{name}' api_url must start with http:// or https://"
                )));
            }
        }

        for (name, limit) in &self.rate_limits {
            if limit.max_requests == 0 || limit.window_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "rate limit '{name}' needs max_requests and window_secs above zero"
                )));
            }
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(ConfigError::ValidationError("agent name must not be empty".into()));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate agent '{}'",
                    agent.name
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self {
            agents: vec![AgentConfig {
                name: "site_checker".into(),
                role: "Website availability monitor".into(),
                goals: "Report whether the requested site is reachable".into(),
                backstory: "Always check the site with a tool before answering.".into(),
                tools: vec!["website_monitor".into()],
                model: None,
                enabled: true,
                tool_configs: HashMap::new(),
            }],
            ..Self::default()
        };
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} is not a valid number: {raw}")))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            max_agent_iterations: default_max_agent_iterations(),
            max_agent_memory_entries: default_max_agent_memory_entries(),
            memory: MemoryConfig::default(),
            providers: HashMap::new(),
            fallback: FallbackConfig::default(),
            context: ContextConfig::default(),
            rate_limits: HashMap::new(),
            agents: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
