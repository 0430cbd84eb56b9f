//! LLM provider adapters.
//!
//! Every backend implements [`ProviderAdapter`]: it translates a
//! [`PromptPayload`] into its own wire format, performs exactly one call, and
//! classifies the result. Adapters never retry, back off or throttle; that is
//! the orchestrator's job.
//!
//! The set of backends is closed and selected by [`ProviderKind`]:
//!
//! - [`OpenAiCompatibleProvider`] - OpenRouter / LiteLLM `chat/completions`
//! - [`AnthropicProvider`] - Anthropic `/v1/messages`
//! - [`ScriptedProvider`] - deterministic replay for tests and offline runs

pub mod anthropic;
pub mod openai_compatible;
pub mod scripted;

pub use anthropic::AnthropicProvider;
pub use openai_compatible::OpenAiCompatibleProvider;
pub use scripted::{ScriptStep, ScriptedProvider, ScriptedReply};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::llm::types::{AttemptOutcome, ProviderId};
use crate::prompts::PromptPayload;
use crate::request::GenerationParameters;

/// A single LLM backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Identifier this adapter is registered under.
    fn id(&self) -> &ProviderId;

    /// Backend family.
    fn kind(&self) -> ProviderKind;

    /// Perform one call and classify its outcome.
    ///
    /// # Arguments
    ///
    /// * `payload` - Rendered prompt
    /// * `params` - Sampling parameters
    ///
    /// # Returns
    ///
    /// `Success` for any well-formed response (even if its content later fails
    /// validation), `Retryable` for network errors, timeouts, 429 and 5xx,
    /// `Fatal` for auth and other request errors.
    async fn send(&self, payload: &PromptPayload, params: &GenerationParameters)
        -> AttemptOutcome;
}

/// Backend family of a configured provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai_compatible", alias = "openrouter", alias = "litellm")]
    OpenAiCompatible,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "scripted")]
    Scripted,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAiCompatible => "openai_compatible",
            Self::Anthropic => "anthropic",
            Self::Scripted => "scripted",
        }
    }

    /// Environment variable holding the API key when none is configured.
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAiCompatible => Some("OPENROUTER_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Scripted => None,
        }
    }

    /// Build an adapter of this kind from its configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the API key variable is unset, the script file
    /// cannot be loaded, or the HTTP client cannot be built.
    pub fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>, ConfigError> {
        let adapter: Arc<dyn ProviderAdapter> = match self {
            Self::OpenAiCompatible => Arc::new(OpenAiCompatibleProvider::new(
                config.id.clone(),
                config.resolve_api_key()?,
                config.base_url.clone(),
                config.model.clone(),
            )?),
            Self::Anthropic => Arc::new(AnthropicProvider::new(
                config.id.clone(),
                config.resolve_api_key()?,
                config.base_url.clone(),
                config.model.clone(),
            )?),
            Self::Scripted => {
                let path = config.script.as_ref().ok_or_else(|| ConfigError::InvalidValue {
                    key: format!("providers.{}.script", config.id),
                    message: "scripted providers need a script file".to_string(),
                })?;
                Arc::new(ScriptedProvider::from_file(config.id.clone(), path)?)
            }
        };
        Ok(adapter)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub kind: ProviderKind,
    /// Overrides the backend's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Overrides the backend's default model.
    #[serde(default)]
    pub model: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Script file replayed by scripted providers.
    #[serde(default)]
    pub script: Option<PathBuf>,
}

impl ProviderConfig {
    pub fn new(id: impl Into<ProviderId>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            kind,
            base_url: None,
            model: None,
            api_key_env: None,
            script: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    pub fn with_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.script = Some(path.into());
        self
    }

    /// Build the adapter described by this configuration.
    pub fn build(&self) -> Result<Arc<dyn ProviderAdapter>, ConfigError> {
        self.kind.build(self)
    }

    fn resolve_api_key(&self) -> Result<String, ConfigError> {
        let var = self
            .api_key_env
            .clone()
            .or_else(|| self.kind.default_api_key_env().map(str::to_string))
            .ok_or_else(|| ConfigError::InvalidValue {
                key: format!("providers.{}.api_key_env", self.id),
                message: "no API key variable configured".to_string(),
            })?;
        std::env::var(&var).map_err(|_| ConfigError::MissingEnvVar(var))
    }
}

/// Registered provider adapters, keyed by id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
    /// Registration order, used as the default preference order.
    order: Vec<ProviderId>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any adapter with the same id.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) -> &mut Self {
        let id = adapter.id().clone();
        if self.adapters.insert(id.clone(), adapter).is_some() {
            tracing::warn!(provider = %id, "Replacing already registered provider");
        } else {
            self.order.push(id);
        }
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Build every configured provider.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` on duplicate ids or if any adapter fails to build.
    pub fn from_configs(configs: &[ProviderConfig]) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for config in configs {
            if registry.adapters.contains_key(&config.id) {
                return Err(ConfigError::ValidationFailed(format!(
                    "duplicate provider id '{}'",
                    config.id
                )));
            }
            registry.register(config.build()?);
            tracing::debug!(provider = %config.id, kind = %config.kind, "Registered provider");
        }
        Ok(registry)
    }

    pub fn get(&self, id: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(id).cloned()
    }

    pub fn contains(&self, id: &ProviderId) -> bool {
        self.adapters.contains_key(id)
    }

    /// Provider ids in registration order.
    pub fn ids(&self) -> &[ProviderId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.order)
            .finish()
    }
}
