//! Anthropic Messages API provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::openai_compatible::mask_key;
use super::{ProviderAdapter, ProviderKind};
use crate::config::ConfigError;
use crate::llm::types::{
    AttemptOutcome, FailureClass, Message, ProviderFailure, ProviderId, ProviderReply,
    RawOutput, TokenUsage,
};
use crate::prompts::PromptPayload;
use crate::request::GenerationParameters;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Provider for Anthropic's `/v1/messages` endpoint.
pub struct AnthropicProvider {
    id: ProviderId,
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    /// Create a new provider.
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
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    pub fn api_key_masked(&self) -> String {
        mask_key(&self.api_key)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn messages_url(&self) -> String {
        if self.base_url.ends_with("/v1/messages") {
            self.base_url.clone()
        } else {
            format!("{}/v1/messages", self.base_url)
        }
    }

    fn build_request(&self, payload: &PromptPayload, params: &GenerationParameters) -> ApiRequest {
        ApiRequest {
            model: self.model.clone(),
            system: payload.system.clone(),
            messages: payload.conversation_messages(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn send(
        &self,
        payload: &PromptPayload,
        params: &GenerationParameters,
    ) -> AttemptOutcome {
        let request = self.build_request(payload, params);

        let response = match self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            tracing::warn!(
                provider = %self.id,
                status = status_code,
                error = %message,
                "Anthropic returned an error status"
            );
            // 529 "overloaded" lands in the server error class.
            return AttemptOutcome::failure(ProviderFailure::from_status(status_code, message));
        }

        let body: ApiResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                return AttemptOutcome::failure(ProviderFailure::new(
                    FailureClass::ServerError,
                    format!("invalid anthropic response: {}", e),
                ))
            }
        };

        let text = body
            .content
            .iter()
            .filter(|part| part.content_type == "text")
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return AttemptOutcome::failure(ProviderFailure::new(
                FailureClass::ServerError,
                "Response contained no text content",
            ));
        }

        AttemptOutcome::Success(ProviderReply {
            output: RawOutput::Text(text),
            usage: body.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
            }),
            model: body.model,
        })
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    system: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ApiContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ApiContent>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
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

    fn provider(base_url: Option<&str>) -> AnthropicProvider {
        AnthropicProvider::new(
            ProviderId::from("anthropic"),
            "sk-ant-0123456789".to_string(),
            base_url.map(str::to_string),
            None,
        )
        .expect("client builds")
    }

    #[test]
    fn test_messages_url() {
        assert_eq!(
            provider(None).messages_url(),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            provider(Some("https://proxy.local/v1/messages")).messages_url(),
            "https://proxy.local/v1/messages"
        );
    }

    #[test]
    fn test_system_prompt_sent_separately() {
        let payload = PromptPayload::new(
            "sys".into(),
            "usr".into(),
            vec![PromptExample::new("in", "out")],
        );
        let body = serde_json::to_value(
            provider(None).build_request(&payload, &GenerationParameters::default()),
        )
        .expect("serializable");

        assert_eq!(body["system"], "sys");
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m["role"] != "system"));
        assert_eq!(body["max_tokens"], 2048);
    }

    #[test]
    fn test_response_text_joined() {
        let raw = r#"{"content":[{"type":"text","text":"{\"a\":"},{"type":"tool_use"},{"type":"text","text":"1}"}],"usage":{"input_tokens":5,"output_tokens":2}}"#;
        let parsed: ApiResponse = serde_json::from_str(raw).expect("parses");
        let text: Vec<&str> = parsed
            .content
            .iter()
            .filter(|p| p.content_type == "text")
            .filter_map(|p| p.text.as_deref())
            .collect();
        assert_eq!(text, vec!["{\"a\":", "1}"]);
        assert_eq!(parsed.usage.map(|u| u.input_tokens), Some(5));
        assert_eq!(provider(None).api_key_masked(), "sk-a...6789");
    }
}
