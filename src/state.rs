// src/state.rs
// Service assembly: stores → policies → router → services.

use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CaseChatConfig;
use crate::llm::provider::{AnthropicProvider, ChatProvider, GeminiProvider, OpenAiProvider};
use crate::llm::registry::{ModelRegistry, ProviderKind};
use crate::llm::resilience::ResilientChat;
use crate::llm::router::ModelRouter;
use crate::session::eligibility::EligibilityPolicy;
use crate::session::position::PositionTracker;
use crate::session::store::SessionStore;
use crate::session::sweeper::AbandonmentSweeper;
use crate::session::SessionService;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub sessions: Arc<SessionService>,
    pub eligibility: Arc<EligibilityPolicy>,
    pub positions: Arc<PositionTracker>,
    pub chat: Arc<ResilientChat>,
    pub sweeper: Arc<AbandonmentSweeper>,
}

impl AppState {
    /// Assemble with the deployed provider adapters.
    pub fn build(pool: SqlitePool, config: &CaseChatConfig) -> Self {
        let mut providers: HashMap<ProviderKind, Arc<dyn ChatProvider>> = HashMap::new();
        providers.insert(
            ProviderKind::OpenAi,
            Arc::new(OpenAiProvider::new(
                config.openai_api_key.clone(),
                config.openai_base_url.clone(),
                config.provider_timeout_secs,
            )),
        );
        providers.insert(
            ProviderKind::Anthropic,
            Arc::new(AnthropicProvider::new(
                config.anthropic_api_key.clone(),
                config.anthropic_base_url.clone(),
                config.provider_timeout_secs,
            )),
        );
        providers.insert(
            ProviderKind::Gemini,
            Arc::new(GeminiProvider::new(
                config.gemini_api_key.clone(),
                config.gemini_base_url.clone(),
                config.provider_timeout_secs,
            )),
        );

        let router = Arc::new(ModelRouter::new(
            ModelRegistry::builtin(),
            providers,
            pool.clone(),
        ));

        Self::assemble(pool, config, router)
    }

    /// Assemble around an existing router (tests inject stub providers here).
    pub fn assemble(pool: SqlitePool, config: &CaseChatConfig, router: Arc<ModelRouter>) -> Self {
        let store = Arc::new(SessionStore::new(pool.clone()));
        let eligibility = Arc::new(EligibilityPolicy::new(pool.clone()));
        let sessions = Arc::new(SessionService::new(store.clone(), eligibility.clone()));
        let positions = Arc::new(PositionTracker::new(
            pool.clone(),
            store.clone(),
            router.clone(),
            config.inference_model.clone(),
        ));
        let chat = Arc::new(ResilientChat::new(
            router,
            Duration::from_secs(config.retry_delay_secs),
        ));
        let sweeper = Arc::new(AbandonmentSweeper::new(
            store,
            Duration::from_secs(config.sweep_interval_secs),
            config.abandon_after_secs(),
        ));

        Self {
            pool,
            sessions,
            eligibility,
            positions,
            chat,
            sweeper,
        }
    }
}
