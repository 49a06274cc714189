// src/llm/provider/openai.rs
// OpenAI chat completions adapter. Prompt caching is reported through
// prompt_tokens_details.cached_tokens.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{CallConfig, ChatMessage, ChatOutcome, ChatProvider, ProviderError, Usage};

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
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
        messages: Vec<Value>,
        config: &CallConfig,
    ) -> Result<ChatOutcome, ProviderError> {
        let mut body = json!({
            "model": config.model,
            "messages": messages,
        });
        if let Some(t) = config.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(effort) = &config.reasoning_effort {
            body["reasoning_effort"] = json!(effort);
        }

        debug!("openai request: model={}", config.model);

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
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

        let text = raw["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("no content in response".into()))?
            .to_string();

        let usage = &raw["usage"];
        let cached_tokens = usage["prompt_tokens_details"]["cached_tokens"]
            .as_i64()
            .unwrap_or(0);

        Ok(ChatOutcome {
            text,
            usage: Usage {
                cache_hit: cached_tokens > 0,
                input_tokens: usage["prompt_tokens"].as_i64().unwrap_or(0),
                cached_tokens,
                output_tokens: usage["completion_tokens"].as_i64().unwrap_or(0),
            },
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(
        &self,
        system: &str,
        history: &[ChatMessage],
        message: &str,
        config: &CallConfig,
    ) -> Result<ChatOutcome, ProviderError> {
        let mut messages = vec![json!({"role": "system", "content": system})];
        for msg in history {
            messages.push(json!({"role": msg.role, "content": msg.content}));
        }
        messages.push(json!({"role": "user", "content": message}));
        self.request(messages, config).await
    }

    async fn evaluate(
        &self,
        prompt: &str,
        config: &CallConfig,
    ) -> Result<ChatOutcome, ProviderError> {
        let messages = vec![json!({"role": "user", "content": prompt})];
        self.request(messages, config).await
    }
}
