// src/llm/router.rs
// Routes a model id to its provider adapter and records one ModelUsageRecord
// per call, success or failure. Holds no provider-specific logic.

use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::provider::{CallConfig, ChatMessage, ChatOutcome, ChatProvider, ProviderError, Usage};
use super::registry::{ModelRegistry, ProviderKind};
use crate::db::now_ts;
use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Chat,
    Eval,
}

impl RequestType {
    fn as_str(&self) -> &'static str {
        match self {
            RequestType::Chat => "chat",
            RequestType::Eval => "eval",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Model(ChatError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl RouterError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RouterError::Provider(ProviderError::RateLimited(_)))
    }
}

impl From<RouterError> for ChatError {
    fn from(e: RouterError) -> Self {
        match e {
            RouterError::Model(inner) => inner,
            RouterError::Provider(_) => ChatError::UpstreamUnavailable,
        }
    }
}

pub struct ModelRouter {
    registry: ModelRegistry,
    providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
    pool: SqlitePool,
}

impl ModelRouter {
    pub fn new(
        registry: ModelRegistry,
        providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
        pool: SqlitePool,
    ) -> Self {
        Self {
            registry,
            providers,
            pool,
        }
    }

    /// Pure lookup; fails before any network call for unknown/disabled
    /// models or unconfigured providers.
    fn route(&self, model_id: &str) -> Result<(CallConfig, &Arc<dyn ChatProvider>), ChatError> {
        let spec = self.registry.lookup(model_id)?;
        let provider = self.providers.get(&spec.provider).ok_or_else(|| {
            ChatError::NotFound(format!("provider {} not configured", spec.provider.as_str()))
        })?;
        let config = CallConfig {
            model: spec.id.clone(),
            temperature: spec.temperature,
            reasoning_effort: spec.reasoning_effort.clone(),
        };
        Ok((config, provider))
    }

    pub async fn chat(
        &self,
        model_id: &str,
        system: &str,
        history: &[ChatMessage],
        message: &str,
        case_id: Option<&str>,
    ) -> Result<ChatOutcome, RouterError> {
        let (config, provider) = self.route(model_id).map_err(RouterError::Model)?;
        let result = provider.chat(system, history, message, &config).await;
        self.record(provider.name(), model_id, RequestType::Chat, &result, case_id)
            .await;
        result.map_err(RouterError::from)
    }

    pub async fn evaluate(
        &self,
        model_id: &str,
        prompt: &str,
        case_id: Option<&str>,
    ) -> Result<ChatOutcome, RouterError> {
        let (config, provider) = self.route(model_id).map_err(RouterError::Model)?;
        let result = provider.evaluate(prompt, &config).await;
        self.record(provider.name(), model_id, RequestType::Eval, &result, case_id)
            .await;
        result.map_err(RouterError::from)
    }

    /// Telemetry write is best-effort: a failed insert must not fail the
    /// student's request.
    async fn record(
        &self,
        provider: &str,
        model_id: &str,
        request_type: RequestType,
        result: &Result<ChatOutcome, ProviderError>,
        case_id: Option<&str>,
    ) {
        let (usage, succeeded) = match result {
            Ok(outcome) => (outcome.usage, true),
            Err(_) => (Usage::default(), false),
        };

        let write = sqlx::query(
            r#"
            INSERT INTO model_usage
                (id, provider, model_id, request_type, cache_hit,
                 input_tokens, cached_tokens, output_tokens, succeeded, case_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(provider)
        .bind(model_id)
        .bind(request_type.as_str())
        .bind(usage.cache_hit)
        .bind(usage.input_tokens)
        .bind(usage.cached_tokens)
        .bind(usage.output_tokens)
        .bind(succeeded)
        .bind(case_id)
        .bind(now_ts())
        .execute(&self.pool)
        .await;

        if let Err(e) = write {
            warn!("failed to record model usage: {}", e);
        }
    }

    /// Per-model aggregates over the append-only telemetry, computed on read.
    pub async fn usage_summary(&self) -> Result<Vec<UsageSummaryRow>, ChatError> {
        let rows: Vec<(String, String, i64, i64, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT provider, model_id, COUNT(*),
                   SUM(cache_hit), SUM(input_tokens), SUM(cached_tokens), SUM(output_tokens)
            FROM model_usage
            GROUP BY provider, model_id
            ORDER BY provider, model_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(provider, model_id, calls, cache_hits, input, cached, output)| UsageSummaryRow {
                    provider,
                    model_id,
                    calls,
                    cache_hits,
                    input_tokens: input,
                    cached_tokens: cached,
                    output_tokens: output,
                },
            )
            .collect())
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct UsageSummaryRow {
    pub provider: String,
    pub model_id: String,
    pub calls: i64,
    pub cache_hits: i64,
    pub input_tokens: i64,
    pub cached_tokens: i64,
    pub output_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::registry::ModelSpec;
    use crate::llm::testing::StubProvider;

    async fn router_with(stub: Arc<StubProvider>) -> ModelRouter {
        let pool = crate::db::connect_memory().await.unwrap();

        let registry = ModelRegistry::new(vec![ModelSpec::new("stub-model", ProviderKind::OpenAi)]);
        let mut providers: HashMap<ProviderKind, Arc<dyn ChatProvider>> = HashMap::new();
        providers.insert(ProviderKind::OpenAi, stub);
        ModelRouter::new(registry, providers, pool)
    }

    #[tokio::test]
    async fn test_unknown_model_fails_before_provider() {
        let stub = Arc::new(StubProvider::replying("hello"));
        let router = router_with(stub.clone()).await;

        let err = router
            .chat("missing-model", "sys", &[], "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Model(ChatError::NotFound(_))));
        assert_eq!(stub.calls(), 0, "no network call for unknown models");
    }

    #[tokio::test]
    async fn test_every_call_records_usage() {
        let stub = Arc::new(StubProvider::replying("hello"));
        let router = router_with(stub).await;

        router.chat("stub-model", "sys", &[], "hi", Some("case-1")).await.unwrap();
        router.evaluate("stub-model", "grade this", None).await.unwrap();

        let summary = router.usage_summary().await.unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].calls, 2);
    }

    #[tokio::test]
    async fn test_failed_call_still_records_usage() {
        let stub = Arc::new(StubProvider::failing_times(99));
        let router = router_with(stub).await;

        let err = router.chat("stub-model", "sys", &[], "hi", None).await.unwrap_err();
        assert!(err.is_rate_limited());

        let summary = router.usage_summary().await.unwrap();
        assert_eq!(summary[0].calls, 1);
        assert_eq!(summary[0].input_tokens, 0);
    }
}
