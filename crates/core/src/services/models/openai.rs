use std::env;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::{ModelError, SamplingParams, TranslationModel};
use crate::model::Conversation;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// OpenAI chat-completions backend.
///
/// Credentials come from `OPENAI_API_KEY`; `TRANSPLANT_OPENAI_BASE_URL` (or
/// `OPENAI_BASE_URL`) points it at a compatible server. A missing key is only
/// reported when a request is made, so the model can still be listed.
pub struct OpenAiModel {
    client: Client,
    model: String,
    api_key: Option<String>,
    api_base: String,
}

impl OpenAiModel {
    pub fn from_env(model: &str) -> Result<Self, ModelError> {
        let api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        let api_base = env::var("TRANSPLANT_OPENAI_BASE_URL")
            .or_else(|_| env::var("OPENAI_BASE_URL"))
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::new(model, api_key, api_base)
    }

    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ModelError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            model: model.into(),
            api_key,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl TranslationModel for OpenAiModel {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate(
        &self,
        conversation: &Conversation,
        params: &SamplingParams,
    ) -> Result<Vec<String>, ModelError> {
        params.validate()?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ModelError::Unavailable("OPENAI_API_KEY not set".into()))?;

        let body = json!({
            "model": self.model,
            "messages": conversation.messages(),
            "temperature": params.temperature,
            "n": params.top_k,
        });
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .map_err(|e| ModelError::Unavailable(format!("request failed: {e}")))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let text = resp.text().unwrap_or_default();
            return Err(ModelError::Unavailable(format!("OpenAI returned {status}: {text}")));
        }
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(ModelError::InvalidRequest(format!("OpenAI returned {status}: {text}")));
        }

        let parsed: ChatResponse = resp
            .json()
            .map_err(|e| ModelError::Unavailable(format!("unreadable OpenAI response: {e}")))?;
        Ok(parsed.choices.into_iter().map(|c| c.message.content.unwrap_or_default()).collect())
    }
}
