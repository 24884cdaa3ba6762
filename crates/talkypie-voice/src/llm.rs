//! Language model over an OpenAI-compatible chat completions endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::capability::{ChatContext, ChatMessage, Generation, LanguageModel};
use crate::error::VoiceError;

/// Upper bound on one completion round-trip.
const LLM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

impl CompletionResponse {
    fn into_generation(self) -> Result<Generation, VoiceError> {
        let text = self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| VoiceError::Llm("completion contained no message".to_string()))?;
        let usage = self.usage.unwrap_or_default();
        Ok(Generation {
            text: text.trim().to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            prompt_cached_tokens: usage
                .prompt_tokens_details
                .map(|d| d.cached_tokens)
                .unwrap_or(0),
        })
    }
}

#[derive(Clone)]
pub struct ChatCompletionsLlm {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsLlm {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(LLM_TIMEOUT)
            .build()
            .map_err(|e| VoiceError::Llm(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for ChatCompletionsLlm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionsLlm")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsLlm {
    async fn generate(&self, chat: &ChatContext) -> Result<Generation, VoiceError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: chat.messages(),
        };

        let mut request = self.client.post(self.endpoint()).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VoiceError::Llm(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Llm(format!(
                "completion endpoint returned {}: {}",
                status, detail
            )));
        }

        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| VoiceError::Llm(format!("invalid completion response: {}", e)))?
            .into_generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ChatRole;

    #[test]
    fn parses_completion_with_usage() {
        let raw = r#"{
            "choices": [{ "message": { "role": "assistant", "content": " Hii Ava! " } }],
            "usage": {
                "prompt_tokens": 210,
                "completion_tokens": 12,
                "prompt_tokens_details": { "cached_tokens": 128 }
            }
        }"#;
        let response: CompletionResponse = serde_json::from_str(raw).unwrap();
        let generation = response.into_generation().unwrap();

        assert_eq!(generation.text, "Hii Ava!");
        assert_eq!(generation.prompt_tokens, 210);
        assert_eq!(generation.completion_tokens, 12);
        assert_eq!(generation.prompt_cached_tokens, 128);
    }

    #[test]
    fn empty_choices_is_an_error() {
        let response: CompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            response.into_generation(),
            Err(VoiceError::Llm(_))
        ));
    }

    #[test]
    fn request_serializes_roles_lowercase() {
        let chat = ChatContext::new("be kind").with(ChatRole::User, "hello");
        let body = CompletionRequest {
            model: "gpt-4.1-mini",
            messages: chat.messages(),
        };
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["model"], "gpt-4.1-mini");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "hello");
    }

    #[test]
    fn endpoint_joins_base_url() {
        let llm = ChatCompletionsLlm::new("https://api.example.com/v1/", "", "m").unwrap();
        assert_eq!(llm.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
