// src/llm/registry.rs
// Model registry: the router resolves a model id here before any network
// call. Unknown or disabled ids are a hard NotFound.

use std::collections::HashMap;

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub id: String,
    pub provider: ProviderKind,
    pub temperature: Option<f64>,
    pub reasoning_effort: Option<String>,
    pub enabled: bool,
}

impl ModelSpec {
    pub fn new(id: &str, provider: ProviderKind) -> Self {
        Self {
            id: id.into(),
            provider,
            temperature: Some(0.7),
            reasoning_effort: None,
            enabled: true,
        }
    }

    pub fn with_reasoning(mut self, effort: &str) -> Self {
        // Reasoning models reject explicit temperature
        self.temperature = None;
        self.reasoning_effort = Some(effort.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

pub struct ModelRegistry {
    models: HashMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(specs: Vec<ModelSpec>) -> Self {
        let models = specs.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self { models }
    }

    /// The deployed model set
    pub fn builtin() -> Self {
        Self::new(vec![
            ModelSpec::new("gpt-4o", ProviderKind::OpenAi),
            ModelSpec::new("gpt-4o-mini", ProviderKind::OpenAi),
            ModelSpec::new("o3-mini", ProviderKind::OpenAi).with_reasoning("medium"),
            ModelSpec::new("claude-sonnet-4-20250514", ProviderKind::Anthropic),
            ModelSpec::new("claude-3-5-haiku-20241022", ProviderKind::Anthropic),
            ModelSpec::new("gemini-2.0-flash", ProviderKind::Gemini),
            ModelSpec::new("gemini-1.5-pro", ProviderKind::Gemini).disabled(),
        ])
    }

    pub fn lookup(&self, model_id: &str) -> Result<&ModelSpec, ChatError> {
        match self.models.get(model_id) {
            Some(spec) if spec.enabled => Ok(spec),
            Some(_) => Err(ChatError::NotFound(format!(
                "model {} (disabled)",
                model_id
            ))),
            None => Err(ChatError::NotFound(format!("model {}", model_id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_model() {
        let registry = ModelRegistry::builtin();
        let spec = registry.lookup("gpt-4o").unwrap();
        assert_eq!(spec.provider, ProviderKind::OpenAi);
        assert!(spec.temperature.is_some());
    }

    #[test]
    fn test_unknown_model_is_not_found() {
        let registry = ModelRegistry::builtin();
        let err = registry.lookup("gpt-99").unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[test]
    fn test_disabled_model_is_not_found() {
        let registry = ModelRegistry::builtin();
        let err = registry.lookup("gemini-1.5-pro").unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[test]
    fn test_reasoning_spec_drops_temperature() {
        let registry = ModelRegistry::builtin();
        let spec = registry.lookup("o3-mini").unwrap();
        assert!(spec.temperature.is_none());
        assert_eq!(spec.reasoning_effort.as_deref(), Some("medium"));
    }
}
