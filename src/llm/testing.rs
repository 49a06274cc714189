// src/llm/testing.rs
// In-process provider stub backing router/resilience tests (unit and
// integration). Never wired into the deployed provider map.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::provider::{CallConfig, ChatMessage, ChatOutcome, ChatProvider, ProviderError, Usage};

pub struct StubProvider {
    reply: String,
    /// Number of leading calls that fail with RateLimited
    fail_first: usize,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.into(),
            fail_first: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Rate-limit the first `n` calls, then succeed
    pub fn failing_times(n: usize) -> Self {
        Self {
            reply: "recovered".into(),
            fail_first: n,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self) -> Result<ChatOutcome, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(ProviderError::RateLimited("stub rate limit".into()));
        }
        Ok(ChatOutcome {
            text: self.reply.clone(),
            usage: Usage {
                cache_hit: false,
                input_tokens: 10,
                cached_tokens: 0,
                output_tokens: 5,
            },
        })
    }
}

#[async_trait]
impl ChatProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn chat(
        &self,
        _system: &str,
        _history: &[ChatMessage],
        _message: &str,
        _config: &CallConfig,
    ) -> Result<ChatOutcome, ProviderError> {
        self.respond()
    }

    async fn evaluate(
        &self,
        _prompt: &str,
        _config: &CallConfig,
    ) -> Result<ChatOutcome, ProviderError> {
        self.respond()
    }
}
