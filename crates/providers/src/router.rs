//! Provider router: resolves model names and routes generations.
//!
//! The router is the [`Generator`] the execution loop talks to. It owns the
//! registered backends, maps model names to them, and walks the configured
//! fallback chain when the primary backend fails or times out.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use toolmark_core::error::ProviderError;
use toolmark_core::message::Message;
use toolmark_core::provider::{GenerationConfig, Generator, Provider};
use tracing::{debug, info, warn};

use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
    /// model name -> provider id
    model_map: HashMap<String, String>,
    /// provider id -> model used when that provider serves as a fallback
    provider_models: HashMap<String, String>,
    fallback: Vec<String>,
    timeout: Duration,
    temperature: f32,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
            model_map: HashMap::new(),
            provider_models: HashMap::new(),
            fallback: Vec::new(),
            timeout: Duration::from_secs(120),
            temperature: 0.7,
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Route `model` to `provider` during name resolution.
    pub fn map_model(&mut self, model: impl Into<String>, provider: impl Into<String>) {
        self.model_map.insert(model.into(), provider.into());
    }

    /// Model to request when `provider` is reached through the fallback chain.
    pub fn with_provider_model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider_models.insert(provider.into(), model.into());
        self
    }

    /// Providers tried, in order, after the resolved one fails.
    pub fn with_fallback(mut self, providers: Vec<String>) -> Self {
        self.fallback = providers;
        self
    }

    /// Per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Ask every provider for its models and map the ones not already routed.
    pub async fn load_models(&mut self) {
        let mut discovered = Vec::new();
        for (name, provider) in &self.providers {
            match provider.list_models().await {
                Ok(models) => {
                    debug!(provider = %name, count = models.len(), "Discovered models");
                    discovered.extend(models.into_iter().map(|m| (m, name.clone())));
                }
                Err(e) => warn!(provider = %name, error = %e, "Could not list models"),
            }
        }
        for (model, provider) in discovered {
            self.model_map.entry(model).or_insert(provider);
        }
    }

    /// The ordered attempts for a resolved `(provider, model)`.
    fn attempts(&self, provider_id: &str, model: &str) -> Vec<(String, String)> {
        let mut chain = vec![(provider_id.to_string(), model.to_string())];
        for name in &self.fallback {
            if chain.iter().any(|(p, _)| p == name) {
                continue;
            }
            let fallback_model = self
                .provider_models
                .get(name)
                .cloned()
                .unwrap_or_else(|| model.to_string());
            chain.push((name.clone(), fallback_model));
        }
        chain
    }
}

#[async_trait]
impl Generator for ProviderRouter {
    async fn generate_response(
        &self,
        prompt: &str,
        model: &str,
        chat_history: &[Message],
    ) -> Result<String, ProviderError> {
        let (provider_id, concrete_model) = self.resolve_model(model);

        let mut messages = chat_history.to_vec();
        messages.push(Message::user(prompt));
        let config = GenerationConfig {
            temperature: self.temperature,
            ..GenerationConfig::default()
        };

        let attempts = self.attempts(&provider_id, &concrete_model);
        let total = attempts.len();
        let mut last_error =
            ProviderError::NotConfigured(format!("Provider '{provider_id}' is not registered"));

        for (i, (name, model)) in attempts.into_iter().enumerate() {
            let Some(provider) = self.get(&name) else {
                warn!(provider = %name, "Skipping unregistered provider");
                continue;
            };
            if i > 0 {
                info!(provider = %name, attempt = i + 1, total, "Fallback: trying provider");
            }

            match tokio::time::timeout(self.timeout, provider.generate(&messages, &model, &config)).await {
                Ok(Ok(response)) => return Ok(response.content),
                Ok(Err(e)) => {
                    warn!(provider = %name, error = %e, "Generation failed");
                    last_error = e;
                }
                Err(_) => {
                    warn!(provider = %name, timeout_secs = self.timeout.as_secs(), "Generation timed out");
                    last_error = ProviderError::Timeout(format!(
                        "Provider '{}' timed out after {}s",
                        name,
                        self.timeout.as_secs()
                    ));
                }
            }
        }

        Err(last_error)
    }

    fn resolve_model(&self, model: &str) -> (String, String) {
        // Explicit "provider:model"; "granite3.2:2b" style tags fall through
        if let Some((prefix, rest)) = model.split_once(':')
            && self.providers.contains_key(prefix)
        {
            return (prefix.to_string(), rest.to_string());
        }

        if let Some(provider) = self.model_map.get(model) {
            return (provider.clone(), model.to_string());
        }

        (self.default_provider.clone(), model.to_string())
    }

    fn provider(&self, provider_id: &str) -> Option<Arc<dyn Provider>> {
        self.get(provider_id)
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &toolmark_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.default_provider)
        .with_temperature(config.default_temperature)
        .with_timeout(Duration::from_secs(config.fallback.timeout_secs));

    for (name, provider_config) in &config.providers {
        router.register(name.clone(), build_provider(config, name));
        for model in &provider_config.models {
            router.map_model(model.clone(), name.clone());
        }
        if let Some(model) = &provider_config.default_model {
            router = router.with_provider_model(name.clone(), model.clone());
        }
    }

    // Ensure the default provider exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        router.register(
            config.default_provider.clone(),
            build_provider(config, &config.default_provider),
        );
    }

    if config.fallback.enabled {
        router = router.with_fallback(config.fallback.providers.clone());
    }

    router
}

fn build_provider(config: &toolmark_config::AppConfig, name: &str) -> Arc<dyn Provider> {
    let provider_config = config.providers.get(name);
    let api_key = provider_config
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone())
        .unwrap_or_default();
    let base_url = provider_config
        .and_then(|p| p.api_url.clone())
        .map(|url| openai_base(name, &url))
        .unwrap_or_else(|| default_base_url(name));

    Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
}

/// Ollama is configured by its root URL; the OpenAI surface lives under /v1.
fn openai_base(name: &str, url: &str) -> String {
    let url = url.trim_end_matches('/');
    if name == "ollama" && !url.ends_with("/v1") {
        format!("{url}/v1")
    } else {
        url.to_string()
    }
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
