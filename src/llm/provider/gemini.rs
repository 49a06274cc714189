// src/llm/provider/gemini.rs
// Gemini generateContent adapter. History roles map user/assistant → user/
// model; implicit context caching shows up as cachedContentTokenCount.
// reasoning_effort is ignored (no generateContent equivalent).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{CallConfig, ChatMessage, ChatOutcome, ChatProvider, ProviderError, Usage};

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
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
        contents: Vec<Value>,
        config: &CallConfig,
    ) -> Result<ChatOutcome, ProviderError> {
        let mut body = json!({ "contents": contents });
        if let Some(system) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        if let Some(t) = config.temperature {
            body["generationConfig"] = json!({ "temperature": t });
        }

        debug!("gemini request: model={}", config.model);

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, config.model, self.api_key
        );
        let response = self.client.post(&url).json(&body).send().await?;

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

        let text = raw["candidates"][0]["content"]["parts"]
            .as_array()
            .and_then(|parts| parts.first())
            .and_then(|p| p["text"].as_str())
            .ok_or_else(|| ProviderError::Malformed("no text part in response".into()))?
            .to_string();

        let usage = &raw["usageMetadata"];
        let cached_tokens = usage["cachedContentTokenCount"].as_i64().unwrap_or(0);

        Ok(ChatOutcome {
            text,
            usage: Usage {
                cache_hit: cached_tokens > 0,
                input_tokens: usage["promptTokenCount"].as_i64().unwrap_or(0),
                cached_tokens,
                output_tokens: usage["candidatesTokenCount"].as_i64().unwrap_or(0),
            },
        })
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn chat(
        &self,
        system: &str,
        history: &[ChatMessage],
        message: &str,
        config: &CallConfig,
    ) -> Result<ChatOutcome, ProviderError> {
        let mut contents = Vec::with_capacity(history.len() + 1);
        for msg in history {
            let role = match msg.role.as_str() {
                "assistant" => "model",
                _ => "user",
            };
            contents.push(json!({
                "role": role,
                "parts": [{ "text": msg.content }],
            }));
        }
        contents.push(json!({
            "role": "user",
            "parts": [{ "text": message }],
        }));
        self.request(Some(system), contents, config).await
    }

    async fn evaluate(
        &self,
        prompt: &str,
        config: &CallConfig,
    ) -> Result<ChatOutcome, ProviderError> {
        let contents = vec![json!({
            "role": "user",
            "parts": [{ "text": prompt }],
        })];
        self.request(None, contents, config).await
    }
}
