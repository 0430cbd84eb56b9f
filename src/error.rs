//! Error types for neuroadapt operations.
//!
//! Defines the error taxonomy of the adaptation pipeline:
//! - Prompt templating input problems
//! - Provider output that fails the adapted-content schema
//! - Exhausted provider/attempt/time budgets
//! - Caller cancellation and pipeline lifecycle errors
//!
//! Provider-level failures (rate limits, auth errors, timeouts) are absorbed
//! by the orchestrator and only ever surface inside an [`ExhaustedError`]
//! attempt trail.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::orchestrator::AttemptRecord;

/// Errors raised while rendering a prompt from profile, assignment and context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Missing required field '{field}' in {source_name}")]
    MissingField {
        source_name: &'static str,
        field: &'static str,
    },

    #[error("Assignment has no content blocks")]
    EmptyAssignment,

    #[error("Assignment content block {index} has an empty body")]
    BlankBlock { index: usize },

    #[error("Custom profile requires non-empty custom instructions")]
    MissingCustomInstructions,
}

/// A single missing or malformed field found while validating provider output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    /// JSON path of the offending field (e.g. `sections[2].body`).
    pub field: String,
    /// What is wrong with it.
    pub problem: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// Provider output rejected by the response validator.
///
/// Lists every offending field so that a repair-retry can tell the provider
/// exactly what to fix.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Adapted content failed validation: {}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// Create a validation error from a list of issues.
    pub fn new(issues: Vec<FieldIssue>) -> Self {
        Self { issues }
    }

    /// Create a validation error with a single issue.
    pub fn single(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            issues: vec![FieldIssue::new(field, problem)],
        }
    }

    /// Names of every offending field, in discovery order.
    pub fn fields(&self) -> Vec<&str> {
        self.issues.iter().map(|i| i.field.as_str()).collect()
    }

    /// Whether the given field is among the offending ones.
    pub fn mentions(&self, field: &str) -> bool {
        self.issues.iter().any(|i| i.field == field)
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Why an orchestration gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// Every provider in the preference order spent its budgets.
    ProvidersExhausted,
    /// The overall request deadline elapsed.
    DeadlineExceeded,
    /// The preference order was empty.
    NoProviders,
    /// The orchestration task ended without publishing an outcome.
    Aborted,
}

impl fmt::Display for ExhaustionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ProvidersExhausted => "all providers exhausted",
            Self::DeadlineExceeded => "overall deadline exceeded",
            Self::NoProviders => "no providers configured",
            Self::Aborted => "orchestration aborted",
        };
        f.write_str(text)
    }
}

/// All providers, attempts or time budget were spent without a valid result.
#[derive(Debug, Clone, Error, Serialize)]
#[error("Adaptation {fingerprint} failed after {} attempt(s): {reason}", .attempts.len())]
pub struct ExhaustedError {
    pub fingerprint: Fingerprint,
    pub reason: ExhaustionReason,
    /// Every attempt made, in order, with its classification.
    pub attempts: Vec<AttemptRecord>,
}

impl ExhaustedError {
    /// One-line summary of the attempt trail, safe to log.
    pub fn summary(&self) -> String {
        let trail = self
            .attempts
            .iter()
            .map(|a| format!("{}#{}={}", a.provider, a.number, a.class))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} [{}]", self.reason, trail)
    }
}

/// Errors crossing the pipeline boundary.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Exhausted(#[from] ExhaustedError),

    #[error("Adaptation cancelled by caller")]
    Cancelled,

    #[error("Invalid adaptation input: {0}")]
    InvalidInput(#[from] TemplateError),

    #[error("Pipeline is shutting down")]
    ShuttingDown,

    #[error("Shutdown timed out after {0:?} with {1} call(s) still in flight")]
    ShutdownTimeout(Duration, usize),
}

impl PipelineError {
    /// A single provider-agnostic message suitable for a renderer, with a
    /// retry affordance where one makes sense.
    pub fn user_message(&self) -> String {
        match self {
            Self::Exhausted(e) if e.reason == ExhaustionReason::DeadlineExceeded => {
                "The adapted version took too long to prepare. Please try again.".to_string()
            }
            Self::Exhausted(_) => {
                "The adapted version could not be prepared right now. Please try again."
                    .to_string()
            }
            Self::Cancelled => "Adaptation was cancelled.".to_string(),
            Self::InvalidInput(e) => format!("This assignment cannot be adapted yet: {}", e),
            Self::ShuttingDown | Self::ShutdownTimeout(..) => {
                "The adaptation service is restarting. Please try again shortly.".to_string()
            }
        }
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = ValidationError::new(vec![
            FieldIssue::new("sections", "missing"),
            FieldIssue::new("complexity", "expected one of low, moderate, high, very_high"),
        ]);

        assert_eq!(err.fields(), vec!["sections", "complexity"]);
        assert!(err.mentions("sections"));
        assert!(!err.mentions("focus_areas"));

        let message = err.to_string();
        assert!(message.contains("sections: missing"));
        assert!(message.contains("complexity: expected one of"));
    }

    #[test]
    fn test_template_error_messages() {
        let err = TemplateError::MissingField {
            source_name: "assignment",
            field: "title",
        };
        assert_eq!(
            err.to_string(),
            "Missing required field 'title' in assignment"
        );
        assert_eq!(
            TemplateError::BlankBlock { index: 3 }.to_string(),
            "Assignment content block 3 has an empty body"
        );
    }

    #[test]
    fn test_user_message_hides_provider_detail() {
        let err = PipelineError::Exhausted(ExhaustedError {
            fingerprint: Fingerprint::from_bytes(&[7u8; 32]),
            reason: ExhaustionReason::ProvidersExhausted,
            attempts: Vec::new(),
        });

        let message = err.user_message();
        assert!(message.contains("try again"));
        assert!(!message.contains("attempt"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_input_not_retryable() {
        let err = PipelineError::from(TemplateError::EmptyAssignment);
        assert!(!err.is_retryable());
        assert!(err.user_message().contains("no content blocks"));
    }
}
