//! Translation model backends.
//!
//! A backend turns a conversation into one or more candidate replies. Backends
//! are registered by name and one is selected at startup.

#[cfg(feature = "openai-backend")]
pub mod openai;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Conversation;

#[cfg(feature = "openai-backend")]
pub use openai::OpenAiModel;

/// OpenAI chat models registered by default.
pub const OPENAI_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "gpt-4.1", "gpt-4.1-mini", "o3-mini"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub top_k: u32,
    pub temperature: f32,
}

impl Default for SamplingParams {
    /// Greedy decoding: one reply at temperature zero.
    fn default() -> Self {
        Self { top_k: 1, temperature: 0.0 }
    }
}

impl SamplingParams {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.top_k == 0 {
            return Err(ModelError::InvalidRequest("top_k must be at least 1".into()));
        }
        if self.top_k != 1 && self.temperature == 0.0 {
            return Err(ModelError::InvalidRequest(
                "Top k sampling requires a non-zero temperature".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    /// Rate limits, outages, missing credentials: retrying locally won't help.
    #[error("Model unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid model request: {0}")]
    InvalidRequest(String),
    #[error("Unknown model `{name}`; registered models: {known}")]
    Unknown { name: String, known: String },
}

/// Capability implemented by every model backend.
pub trait TranslationModel: Send + Sync {
    fn name(&self) -> &str;

    /// Return `params.top_k` candidate replies to `conversation`.
    fn generate(
        &self,
        conversation: &Conversation,
        params: &SamplingParams,
    ) -> Result<Vec<String>, ModelError>;
}

/// Reply used by `DummyModel`: well-formed, does nothing.
pub const DUMMY_RESPONSE: &str = "<FUNC>\n// Hello World\n</FUNC>\n<WRAPPER>\n// Hello World\n</WRAPPER>";

/// Offline backend that always returns the same placeholder translation.
/// Useful for exercising the pipeline plumbing without network access.
pub struct DummyModel;

impl TranslationModel for DummyModel {
    fn name(&self) -> &str {
        "dummy"
    }

    fn generate(
        &self,
        _conversation: &Conversation,
        params: &SamplingParams,
    ) -> Result<Vec<String>, ModelError> {
        params.validate()?;
        Ok((0..params.top_k).map(|_| DUMMY_RESPONSE.to_string()).collect())
    }
}

/// Registry for model backends; callers select by name.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, Box<dyn TranslationModel>>,
    aliases: HashMap<String, String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: TranslationModel + 'static>(&mut self, model: M) -> &mut Self {
        self.models.insert(model.name().to_string(), Box::new(model));
        self
    }

    /// Make `alias` resolve to the model registered as `target`.
    pub fn alias(&mut self, alias: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.aliases.insert(alias.into(), target.into());
        self
    }

    fn resolve<'n>(&'n self, name: &'n str) -> &'n str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn TranslationModel> {
        self.models.get(self.resolve(name)).map(|m| &**m)
    }

    /// Remove and return a model so the caller can own it.
    pub fn take(&mut self, name: &str) -> Result<Box<dyn TranslationModel>, ModelError> {
        let key = self.resolve(name).to_string();
        match self.models.remove(&key) {
            Some(model) => Ok(model),
            None => Err(ModelError::Unknown { name: name.to_string(), known: self.names().join(", ") }),
        }
    }

    /// Return a sorted list of registered model names for error messages/help.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.models.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Registry populated with the dummy backend and, when enabled, the OpenAI
/// chat models.
pub fn default_model_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.register(DummyModel);
    #[cfg(feature = "openai-backend")]
    {
        for id in OPENAI_MODELS {
            match OpenAiModel::from_env(id) {
                Ok(model) => {
                    registry.register(model);
                }
                Err(e) => tracing::warn!(model = %id, error = %e, "skipping OpenAI model"),
            }
        }
    }
    registry.alias("gpt4o-mini", "gpt-4o-mini").alias("gpt4o", "gpt-4o");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greedy_sampling_with_several_candidates_is_rejected() {
        let params = SamplingParams { top_k: 3, temperature: 0.0 };
        assert!(matches!(params.validate(), Err(ModelError::InvalidRequest(_))));
        assert!(SamplingParams { top_k: 3, temperature: 0.7 }.validate().is_ok());
    }

    #[test]
    fn dummy_model_returns_top_k_replies() {
        let params = SamplingParams { top_k: 2, temperature: 0.5 };
        let replies = DummyModel.generate(&Conversation::new(), &params).unwrap();
        assert_eq!(replies.len(), 2);
        assert!(replies[0].contains("<FUNC>"));
    }

    #[test]
    fn registry_resolves_aliases_and_reports_unknown_names() {
        let mut registry = ModelRegistry::new();
        registry.register(DummyModel).alias("placeholder", "dummy");
        assert!(registry.get("placeholder").is_some());

        let err = registry.take("nope").err().unwrap();
        assert!(err.to_string().contains("dummy"));
        assert_eq!(registry.take("placeholder").unwrap().name(), "dummy");
        assert!(registry.names().is_empty());
    }
}
