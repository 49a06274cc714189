// src/llm/resilience.rs
// Narrow, product-specific retry contract around the router: on a rate limit
// the student sees an in-character "please wait", we wait a fixed interval,
// retry exactly once, and splice a "thank you for your patience" continuation
// so the transcript reads naturally. Technical detail never reaches the
// student; exhaustion raises an operator alert on its own log target.
// This is deliberately not exponential backoff or a circuit breaker.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use super::provider::{ChatMessage, Usage};
use super::router::{ModelRouter, RouterError};
use crate::error::ChatError;

/// Assistant messages produced by one resilient chat call, in transcript
/// order. On the happy path this is just the reply; after a recovered rate
/// limit it is [wait, thanks, reply]; on exhaustion it ends with the apology.
#[derive(Debug, Clone)]
pub struct ChatExchange {
    pub messages: Vec<String>,
    pub usage: Option<Usage>,
    pub retried: bool,
    /// True when the apology path was taken and no model reply exists
    pub degraded: bool,
}

pub struct ResilientChat {
    router: Arc<ModelRouter>,
    retry_delay: Duration,
}

impl ResilientChat {
    pub fn new(router: Arc<ModelRouter>, retry_delay: Duration) -> Self {
        Self {
            router,
            retry_delay,
        }
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    /// Conversational call with the single-retry contract. Model-resolution
    /// errors (unknown id) propagate as typed errors; provider failures are
    /// absorbed into the in-character transcript.
    pub async fn chat(
        &self,
        model_id: &str,
        system: &str,
        history: &[ChatMessage],
        message: &str,
        case_id: Option<&str>,
        persona: &str,
    ) -> Result<ChatExchange, ChatError> {
        let first = self
            .router
            .chat(model_id, system, history, message, case_id)
            .await;

        let first_err = match first {
            Ok(outcome) => {
                return Ok(ChatExchange {
                    messages: vec![outcome.text],
                    usage: Some(outcome.usage),
                    retried: false,
                    degraded: false,
                })
            }
            Err(RouterError::Model(e)) => return Err(e),
            Err(e) => e,
        };

        let rate_limited = first_err.is_rate_limited();
        warn!(
            "provider call failed (rate_limited={}), retrying once in {:?}: {}",
            rate_limited, self.retry_delay, first_err
        );

        // The wait message is already "sent" from the student's perspective;
        // the delay is scoped to this request and blocks nothing else.
        let mut messages = Vec::new();
        if rate_limited {
            messages.push(wait_message(persona));
            tokio::time::sleep(self.retry_delay).await;
        }

        let second = self
            .router
            .chat(model_id, system, history, message, case_id)
            .await;

        match second {
            Ok(outcome) => {
                if rate_limited {
                    messages.push(thanks_message(persona));
                }
                messages.push(outcome.text);
                Ok(ChatExchange {
                    messages,
                    usage: Some(outcome.usage),
                    retried: true,
                    degraded: false,
                })
            }
            Err(RouterError::Model(e)) => Err(e),
            Err(e) => {
                error!(
                    target: "operator_alert",
                    "provider exhausted retries for model {}: {}", model_id, e
                );
                messages.push(apology_message(persona));
                Ok(ChatExchange {
                    messages,
                    usage: None,
                    retried: true,
                    degraded: true,
                })
            }
        }
    }

    /// Single-shot evaluation with the same one-retry rule. No transcript to
    /// keep natural, so exhaustion is a typed UpstreamUnavailable.
    pub async fn evaluate(
        &self,
        model_id: &str,
        prompt: &str,
        case_id: Option<&str>,
    ) -> Result<String, ChatError> {
        match self.router.evaluate(model_id, prompt, case_id).await {
            Ok(outcome) => return Ok(outcome.text),
            Err(RouterError::Model(e)) => return Err(e),
            Err(e) => {
                warn!("evaluation call failed, retrying once: {}", e);
                if e.is_rate_limited() {
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }

        match self.router.evaluate(model_id, prompt, case_id).await {
            Ok(outcome) => Ok(outcome.text),
            Err(RouterError::Model(e)) => Err(e),
            Err(e) => {
                error!(
                    target: "operator_alert",
                    "evaluation exhausted retries for model {}: {}", model_id, e
                );
                Err(ChatError::UpstreamUnavailable)
            }
        }
    }
}

/// In-character stall while the provider recovers. Keyed by persona profile
/// so the protagonist's voice holds.
fn wait_message(persona: &str) -> String {
    match persona {
        "strict" => "Hold that thought. Something urgent needs my attention; give me a moment."
            .to_string(),
        _ => "One moment, please. I need to step away briefly, but I'll be right back with you."
            .to_string(),
    }
}

fn thanks_message(persona: &str) -> String {
    match persona {
        "strict" => "Thank you for your patience. Now, where were we.".to_string(),
        _ => "Thank you for your patience! Now, back to what you were saying.".to_string(),
    }
}

fn apology_message(persona: &str) -> String {
    match persona {
        "strict" => "My apologies. I am being pulled away; let's resume shortly.".to_string(),
        _ => "I'm very sorry, something has come up on my end. Let's pick this up again in a few minutes."
            .to_string(),
    }
}
