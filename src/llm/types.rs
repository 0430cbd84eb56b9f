//! Provider-agnostic transport types.
//!
//! Every provider adapter speaks in these types: a normalized chat message
//! list goes out, and an [`AttemptOutcome`] comes back with the failure
//! already classified as retryable or fatal.

use serde::{Deserialize, Serialize};

/// Identifier of a configured provider (e.g. "openrouter", "anthropic").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("system", "user", "assistant").
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Raw, unvalidated provider output.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    /// Free text, possibly wrapping JSON in prose or code fences.
    Text(String),
    /// Already-parsed structured payload (tool/JSON mode responses).
    Structured(serde_json::Value),
}

/// HTTP-like status class of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    RateLimited,
    Auth,
    MalformedRequest,
    ServerError,
    Network,
    Timeout,
    /// Provider id not present in the registry.
    UnknownProvider,
}

impl FailureClass {
    /// Classify a non-success HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            401 | 403 => Self::Auth,
            408 => Self::Timeout,
            400..=499 => Self::MalformedRequest,
            _ => Self::ServerError,
        }
    }

    /// Whether the same provider may be tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::Network | Self::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Auth => "auth",
            Self::MalformedRequest => "malformed_request",
            Self::ServerError => "server_error",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::UnknownProvider => "unknown_provider",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified provider failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub class: FailureClass,
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
}

impl ProviderFailure {
    pub fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            status: None,
        }
    }

    /// Failure built from a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            class: FailureClass::from_status(status),
            message: message.into(),
            status: Some(status),
        }
    }

    /// Transport failure from reqwest.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let class = if err.is_timeout() {
            FailureClass::Timeout
        } else {
            FailureClass::Network
        };
        Self::new(class, err.to_string())
    }
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.class, status, self.message),
            None => write!(f, "{}: {}", self.class, self.message),
        }
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A well-formed provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub output: RawOutput,
    pub usage: Option<TokenUsage>,
    /// Model that actually answered, if reported.
    pub model: Option<String>,
}

impl ProviderReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            output: RawOutput::Text(text.into()),
            usage: None,
            model: None,
        }
    }

    pub fn structured(value: serde_json::Value) -> Self {
        Self {
            output: RawOutput::Structured(value),
            usage: None,
            model: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Outcome of one provider attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(ProviderReply),
    Retryable(ProviderFailure),
    Fatal(ProviderFailure),
}

impl AttemptOutcome {
    /// Wrap a failure in the variant its class calls for.
    pub fn failure(failure: ProviderFailure) -> Self {
        if failure.class.is_retryable() {
            Self::Retryable(failure)
        } else {
            Self::Fatal(failure)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(FailureClass::from_status(429), FailureClass::RateLimited);
        assert_eq!(FailureClass::from_status(401), FailureClass::Auth);
        assert_eq!(FailureClass::from_status(403), FailureClass::Auth);
        assert_eq!(FailureClass::from_status(400), FailureClass::MalformedRequest);
        assert_eq!(FailureClass::from_status(422), FailureClass::MalformedRequest);
        assert_eq!(FailureClass::from_status(500), FailureClass::ServerError);
        assert_eq!(FailureClass::from_status(529), FailureClass::ServerError);
        assert_eq!(FailureClass::from_status(408), FailureClass::Timeout);
    }

    #[test]
    fn test_retryable_classes() {
        assert!(FailureClass::RateLimited.is_retryable());
        assert!(FailureClass::ServerError.is_retryable());
        assert!(FailureClass::Network.is_retryable());
        assert!(FailureClass::Timeout.is_retryable());
        assert!(!FailureClass::Auth.is_retryable());
        assert!(!FailureClass::MalformedRequest.is_retryable());
        assert!(!FailureClass::UnknownProvider.is_retryable());
    }

    #[test]
    fn test_attempt_outcome_from_failure() {
        let retryable = AttemptOutcome::failure(ProviderFailure::from_status(503, "busy"));
        assert!(matches!(retryable, AttemptOutcome::Retryable(_)));

        let fatal = AttemptOutcome::failure(ProviderFailure::from_status(401, "bad key"));
        assert!(matches!(fatal, AttemptOutcome::Fatal(_)));
    }

    #[test]
    fn test_failure_display() {
        let failure = ProviderFailure::from_status(429, "slow down");
        assert_eq!(failure.to_string(), "rate_limited (429): slow down");

        let failure = ProviderFailure::new(FailureClass::Network, "connection refused");
        assert_eq!(failure.to_string(), "network: connection refused");
    }

    #[test]
    fn test_provider_id_conversions() {
        let id: ProviderId = "openrouter".into();
        assert_eq!(id.as_str(), "openrouter");
        assert_eq!(id.to_string(), "openrouter");
        assert_eq!(ProviderId::new(String::from("x")), ProviderId::from("x"));
    }
}
