//! LLM integration for neuroadapt.
//!
//! This module provides the provider-agnostic transport types, the provider
//! adapters and per-provider usage accounting.
//!
//! # Providers
//!
//! ```ignore
//! use neuroadapt::llm::providers::{ProviderConfig, ProviderKind, ProviderRegistry};
//!
//! let registry = ProviderRegistry::from_configs(&[
//!     ProviderConfig::new("openrouter", ProviderKind::OpenAiCompatible),
//!     ProviderConfig::new("anthropic", ProviderKind::Anthropic),
//! ])?;
//! ```
//!
//! # Usage Tracking
//!
//! ```
//! use neuroadapt::llm::{AttemptOutcome, ProviderId, ProviderReply, UsageTracker};
//!
//! let tracker = UsageTracker::new();
//! tracker.record(&ProviderId::from("openrouter"), &AttemptOutcome::Success(ProviderReply::text("{}")));
//! assert_eq!(tracker.total_calls(), 1);
//! ```

pub mod providers;
pub mod types;
pub mod usage;

pub use providers::{
    AnthropicProvider, OpenAiCompatibleProvider, ProviderAdapter, ProviderConfig, ProviderKind,
    ProviderRegistry, ScriptStep, ScriptedProvider, ScriptedReply,
};
pub use types::{
    AttemptOutcome, FailureClass, Message, ProviderFailure, ProviderId, ProviderReply, RawOutput,
    TokenUsage,
};
pub use usage::{ProviderUsage, UsageReport, UsageTracker};
