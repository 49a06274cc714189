// src/llm/provider/mod.rs
// Uniform adapter contract over the upstream AI providers. Each adapter
// normalizes its provider's cache accounting into one Usage shape so the
// telemetry downstream is provider-agnostic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod anthropic;
pub mod gemini;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// One turn of conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Normalized token accounting for one provider call
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Usage {
    pub cache_hit: bool,
    pub input_tokens: i64,
    pub cached_tokens: i64,
    pub output_tokens: i64,
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub usage: Usage,
}

/// Per-call configuration attached by the router from the model registry.
/// Adapters silently ignore fields their provider does not support.
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub model: String,
    pub temperature: Option<f64>,
    pub reasoning_effort: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Rate limit or overload; the resilience wrapper retries these once
    #[error("provider rate limited: {0}")]
    RateLimited(String),

    #[error("provider API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("provider network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Uniform call contract, implemented once per upstream provider.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for telemetry and logging
    fn name(&self) -> &'static str;

    /// Multi-turn conversational call
    async fn chat(
        &self,
        system: &str,
        history: &[ChatMessage],
        message: &str,
        config: &CallConfig,
    ) -> Result<ChatOutcome, ProviderError>;

    /// Single-shot call, no history (evaluation, position inference)
    async fn evaluate(&self, prompt: &str, config: &CallConfig)
        -> Result<ChatOutcome, ProviderError>;
}
