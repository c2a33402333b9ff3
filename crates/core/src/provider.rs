//! Provider traits: the abstraction over LLM backends.
//!
//! Two layers:
//! - [`Provider`] is one backend (an OpenAI-compatible endpoint, Ollama, a
//!   test double). It turns an ordered message list into text.
//! - [`Generator`] is the manager facade the execution loop talks to. It
//!   resolves model names to providers and offers the prompt-plus-history
//!   entry point used on the common path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ProviderError;
use crate::message::Message;

/// Sampling parameters for a single generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate; `None` leaves it to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: None,
            stream: false,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// The generated text
    pub content: String,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// The provider that served the request
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A single LLM backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "ollama", "openai").
    fn name(&self) -> &str;

    /// Generate a reply to an ordered list of messages.
    async fn generate(
        &self,
        messages: &[Message],
        model: &str,
        config: &GenerationConfig,
    ) -> std::result::Result<GenerationResponse, ProviderError>;

    /// List available models for this provider.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

/// The generation collaborator used by the execution loop.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a reply to `prompt`, given prior chat turns.
    async fn generate_response(
        &self,
        prompt: &str,
        model: &str,
        chat_history: &[Message],
    ) -> std::result::Result<String, ProviderError>;

    /// Map a model name to `(provider_id, concrete_model)`.
    fn resolve_model(&self, model: &str) -> (String, String);

    /// Look up a backend by id.
    fn provider(&self, provider_id: &str) -> Option<Arc<dyn Provider>>;
}
