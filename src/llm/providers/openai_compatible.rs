//! OpenAI-compatible `chat/completions` provider.
//!
//! Covers OpenRouter, LiteLLM proxies and any other endpoint that speaks the
//! OpenAI chat completions protocol.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ProviderAdapter, ProviderKind};
use crate::config::ConfigError;
use crate::llm::types::{
    AttemptOutcome, FailureClass, Message, ProviderFailure, ProviderId, ProviderReply,
    RawOutput, TokenUsage,
};
use crate::prompts::PromptPayload;
use crate::request::GenerationParameters;

/// Default OpenRouter API endpoint.
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default model to use if none specified.
const DEFAULT_MODEL: &str = "moonshotai/kimi-k2.5";

/// Connection establishment timeout. The overall attempt deadline is enforced
/// by the orchestrator.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Provider for OpenAI-compatible chat completion APIs.
pub struct OpenAiCompatibleProvider {
    id: ProviderId,
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider.
    ///
    /// # Arguments
    ///
    /// * `id` - Registry id
    /// * `api_key` - Bearer token
    /// * `base_url` - Endpoint root, defaults to OpenRouter
    /// * `model` - Model identifier, defaults to `moonshotai/kimi-k2.5`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the HTTP client cannot be built.
    pub fn new(
        id: ProviderId,
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: format!("providers.{}", id),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            id,
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| OPENROUTER_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// Get the API key (for debugging, returns masked value).
    pub fn api_key_masked(&self) -> String {
        mask_key(&self.api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, payload: &PromptPayload, params: &GenerationParameters) -> ApiRequest {
        ApiRequest {
            model: self.model.clone(),
            messages: payload.to_messages(),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAiCompatible
    }

    async fn send(
        &self,
        payload: &PromptPayload,
        params: &GenerationParameters,
    ) -> AttemptOutcome {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(payload, params);

        let response = match self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", "https://neuroadapt.local")
            .header("X-Title", "neuroadapt")
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::failure(ProviderFailure::from_transport(&e)),
        };

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);

            tracing::warn!(
                provider = %self.id,
                status = status_code,
                error = %message,
                "Provider returned an error status"
            );
            return AttemptOutcome::failure(ProviderFailure::from_status(status_code, message));
        }

        let api_response: ApiResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                return AttemptOutcome::failure(ProviderFailure::new(
                    FailureClass::ServerError,
                    format!("Failed to parse API response: {}", e),
                ))
            }
        };

        let Some(content) = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
        else {
            return AttemptOutcome::failure(ProviderFailure::new(
                FailureClass::ServerError,
                "Response contained no message content",
            ));
        };

        AttemptOutcome::Success(ProviderReply {
            output: RawOutput::Text(content),
            usage: api_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
            model: api_response.model,
        })
    }
}

/// Mask all but the first and last four characters of a key.
pub(crate) fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::PromptExample;

    fn provider() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(
            ProviderId::from("openrouter"),
            "sk-1234567890abcdef".to_string(),
            None,
            None,
        )
        .expect("client builds")
    }

    #[test]
    fn test_defaults() {
        let provider = provider();
        assert_eq!(provider.base_url(), OPENROUTER_BASE_URL);
        assert_eq!(provider.model(), DEFAULT_MODEL);
        assert_eq!(provider.api_key_masked(), "sk-1...cdef");
    }

    #[test]
    fn test_custom_url_trailing_slash() {
        let provider = OpenAiCompatibleProvider::new(
            ProviderId::from("litellm"),
            "key".to_string(),
            Some("http://localhost:4000/".to_string()),
            Some("gpt-4o-mini".to_string()),
        )
        .expect("client builds");
        assert_eq!(provider.base_url(), "http://localhost:4000");
        assert_eq!(provider.model(), "gpt-4o-mini");
        assert_eq!(provider.api_key_masked(), "***");
    }

    #[test]
    fn test_mask_key_non_ascii() {
        assert_eq!(mask_key("añéx-clave-secrètà"), "añéx...rètà");
        assert_eq!(mask_key("ключ"), "****");
    }

    #[test]
    fn test_request_body_shape() {
        let payload = PromptPayload::new(
            "sys".into(),
            "usr".into(),
            vec![PromptExample::new("in", "out")],
        );
        let params = GenerationParameters::default().with_max_tokens(300);
        let body = serde_json::to_value(provider().build_request(&payload, &params))
            .expect("serializable");

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 300);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(4));
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[test]
    fn test_response_parsing_tolerates_missing_usage() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{}"}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(body).expect("parses");
        assert!(parsed.usage.is_none());
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{}"));
    }
}
