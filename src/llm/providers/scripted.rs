//! Deterministic scripted provider.
//!
//! Replays a queue of pre-recorded outcomes, one per call, optionally after a
//! delay. Used by the test suite and by the CLI's `--offline` mode.
//!
//! Script files are JSON arrays of steps:
//!
//! ```json
//! [
//!   {"outcome": "retryable", "class": "rate_limited", "message": "slow down"},
//!   {"outcome": "success", "delay_ms": 200, "body": {"sections": [], "complexity": "low"}},
//!   {"outcome": "text", "text": "```json\n{...}\n```"}
//! ]
//! ```

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{ProviderAdapter, ProviderKind};
use crate::config::ConfigError;
use crate::llm::types::{
    AttemptOutcome, FailureClass, ProviderFailure, ProviderId, ProviderReply,
};
use crate::prompts::PromptPayload;
use crate::request::GenerationParameters;

/// One scripted reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScriptedReply {
    /// Structured success payload.
    Success { body: serde_json::Value },
    /// Free-text success payload.
    Text { text: String },
    Retryable { class: FailureClass, message: String },
    Fatal { class: FailureClass, message: String },
}

impl ScriptedReply {
    fn into_outcome(self) -> AttemptOutcome {
        match self {
            Self::Success { body } => AttemptOutcome::Success(ProviderReply::structured(body)),
            Self::Text { text } => AttemptOutcome::Success(ProviderReply::text(text)),
            // The class decides, the same way live adapters classify.
            Self::Retryable { class, message } | Self::Fatal { class, message } => {
                AttemptOutcome::failure(ProviderFailure::new(class, message))
            }
        }
    }

    /// Reject failure steps whose tag disagrees with their class.
    fn check(&self) -> Result<(), String> {
        match self {
            Self::Retryable { class, .. } if !class.is_retryable() => {
                Err(format!("class {} is not retryable", class))
            }
            Self::Fatal { class, .. } if class.is_retryable() => {
                Err(format!("class {} is retryable, not fatal", class))
            }
            _ => Ok(()),
        }
    }
}

/// A reply plus the simulated latency before it is returned.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptStep {
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(flatten)]
    pub reply: ScriptedReply,
}

/// Provider that replays a fixed script.
#[derive(Debug)]
pub struct ScriptedProvider {
    id: ProviderId,
    steps: Mutex<VecDeque<ScriptStep>>,
    calls: AtomicUsize,
    /// Payloads received, in call order.
    received: Mutex<Vec<PromptPayload>>,
}

impl ScriptedProvider {
    /// Create a provider with an empty script.
    pub fn new(id: impl Into<ProviderId>) -> Self {
        Self {
            id: id.into(),
            steps: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider from a list of steps.
    pub fn with_steps(id: impl Into<ProviderId>, steps: Vec<ScriptStep>) -> Self {
        let provider = Self::new(id);
        provider.lock_steps().extend(steps);
        provider
    }

    /// Load a script from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or is not a valid script.
    pub fn from_file(id: impl Into<ProviderId>, path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let steps: Vec<ScriptStep> =
            serde_json::from_str(&content).map_err(|e| ConfigError::InvalidValue {
                key: path.display().to_string(),
                message: format!("invalid provider script: {}", e),
            })?;
        for (index, step) in steps.iter().enumerate() {
            step.reply.check().map_err(|message| ConfigError::InvalidValue {
                key: format!("{}[{}]", path.display(), index),
                message,
            })?;
        }
        Ok(Self::with_steps(id, steps))
    }

    /// Append a step.
    pub fn then(self, step: ScriptStep) -> Self {
        self.lock_steps().push_back(step);
        self
    }

    /// Append a structured success.
    pub fn then_success(self, body: serde_json::Value) -> Self {
        self.then_after(0, ScriptedReply::Success { body })
    }

    /// Append a free-text success.
    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.then_after(0, ScriptedReply::Text { text: text.into() })
    }

    /// Append a retryable failure. A class that is not retryable replays as
    /// a fatal failure.
    pub fn then_retryable(self, class: FailureClass) -> Self {
        self.then_after(
            0,
            ScriptedReply::Retryable {
                class,
                message: format!("scripted {}", class),
            },
        )
    }

    /// Append a fatal failure. A retryable class replays as retryable.
    pub fn then_fatal(self, class: FailureClass) -> Self {
        self.then_after(
            0,
            ScriptedReply::Fatal {
                class,
                message: format!("scripted {}", class),
            },
        )
    }

    /// Append a reply returned after `delay_ms` milliseconds.
    pub fn then_after(self, delay_ms: u64, reply: ScriptedReply) -> Self {
        self.then(ScriptStep { delay_ms, reply })
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Steps not yet replayed.
    pub fn remaining(&self) -> usize {
        self.lock_steps().len()
    }

    /// Payloads received so far.
    pub fn received(&self) -> Vec<PromptPayload> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_steps(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptStep>> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Scripted
    }

    async fn send(
        &self,
        payload: &PromptPayload,
        _params: &GenerationParameters,
    ) -> AttemptOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload.clone());

        let step = self.lock_steps().pop_front();
        let Some(step) = step else {
            return AttemptOutcome::Fatal(ProviderFailure::new(
                FailureClass::MalformedRequest,
                "script exhausted",
            ));
        };

        if step.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        }

        tracing::debug!(provider = %self.id, call = self.calls(), "Replaying scripted step");
        step.reply.into_outcome()
    }
}
