// src/llm/provider/anthropic.rs
// Anthropic messages API adapter. Cache reuse is reported through
// usage.cache_read_input_tokens; reasoning_effort has no equivalent here and
// is ignored.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{CallConfig, ChatMessage, ChatOutcome, ChatProvider, ProviderError, Usage};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            base_url,
        }
    }

    async fn request(
        &self,
        system: Option<&str>,
        messages: Vec<Value>,
        config: &CallConfig,
    ) -> Result<ChatOutcome, ProviderError> {
        let mut body = json!({
            "model": config.model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(t) = config.temperature {
            body["temperature"] = json!(t);
        }

        debug!("anthropic request: model={}", config.model);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        // 429 is the documented rate limit; 529 is the overloaded signal
        if status.as_u16() == 429 || status.as_u16() == 529 {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::RateLimited(text));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let raw: Value = response.json().await?;

        let text = raw["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b["type"] == "text")
                    .and_then(|b| b["text"].as_str())
            })
            .ok_or_else(|| ProviderError::Malformed("no text block in response".into()))?
            .to_string();

        let usage = &raw["usage"];
        let cached_tokens = usage["cache_read_input_tokens"].as_i64().unwrap_or(0);

        Ok(ChatOutcome {
            text,
            usage: Usage {
                cache_hit: cached_tokens > 0,
                input_tokens: usage["input_tokens"].as_i64().unwrap_or(0),
                cached_tokens,
                output_tokens: usage["output_tokens"].as_i64().unwrap_or(0),
            },
        })
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn chat(
        &self,
        system: &str,
        history: &[ChatMessage],
        message: &str,
        config: &CallConfig,
    ) -> Result<ChatOutcome, ProviderError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        for msg in history {
            messages.push(json!({"role": msg.role, "content": msg.content}));
        }
        messages.push(json!({"role": "user", "content": message}));
        self.request(Some(system), messages, config).await
    }

    async fn evaluate(
        &self,
        prompt: &str,
        config: &CallConfig,
    ) -> Result<ChatOutcome, ProviderError> {
        let messages = vec![json!({"role": "user", "content": prompt})];
        self.request(None, messages, config).await
    }
}
