// src/llm/mod.rs
// Model routing, provider adapters, and the retry contract.

pub mod provider;
pub mod registry;
pub mod resilience;
pub mod router;
pub mod testing;

pub use provider::{ChatMessage, ChatOutcome, ChatProvider, Usage};
pub use registry::{ModelRegistry, ModelSpec, ProviderKind};
pub use resilience::{ChatExchange, ResilientChat};
pub use router::ModelRouter;
