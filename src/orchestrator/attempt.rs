//! Provider attempts and the attempt trail.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::llm::{FailureClass, ProviderId};

/// Why an attempt was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptKind {
    /// Regular dispatch, counted against the transport budget.
    Transport,
    /// Re-ask after invalid output, counted against the repair budget.
    Repair,
}

/// Classification of a finished attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "class")]
pub enum AttemptClass {
    Succeeded,
    Retryable(FailureClass),
    Fatal(FailureClass),
    /// Well-formed response whose content failed validation.
    InvalidOutput,
}

impl fmt::Display for AttemptClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("succeeded"),
            Self::Retryable(class) => write!(f, "retryable:{}", class),
            Self::Fatal(class) => write!(f, "fatal:{}", class),
            Self::InvalidOutput => f.write_str("invalid_output"),
        }
    }
}

/// One (provider, attempt number) dispatch. Never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: ProviderId,
    /// 1-indexed per provider and budget.
    pub number: u32,
    pub kind: AttemptKind,
}

impl ProviderAttempt {
    pub fn transport(provider: ProviderId, number: u32) -> Self {
        Self {
            provider,
            number,
            kind: AttemptKind::Transport,
        }
    }

    pub fn repair(provider: ProviderId, number: u32) -> Self {
        Self {
            provider,
            number,
            kind: AttemptKind::Repair,
        }
    }

    /// Close the attempt with its classification.
    pub fn finish(self, class: AttemptClass, detail: Option<String>, elapsed: Duration) -> AttemptRecord {
        AttemptRecord {
            provider: self.provider,
            number: self.number,
            kind: self.kind,
            class,
            detail,
            elapsed_ms: elapsed.as_millis().min(u128::from(u64::MAX)) as u64,
        }
    }
}

/// A finished attempt in the trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub provider: ProviderId,
    pub number: u32,
    pub kind: AttemptKind,
    pub class: AttemptClass,
    /// Failure message or validation summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

impl AttemptRecord {
    /// Whether the record consumed the provider's transport budget.
    pub fn is_transport(&self) -> bool {
        self.kind == AttemptKind::Transport
    }
}

impl fmt::Display for AttemptRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            AttemptKind::Transport => "",
            AttemptKind::Repair => " (repair)",
        };
        write!(f, "{} #{}{}: {}", self.provider, self.number, kind, self.class)?;
        if let Some(detail) = &self.detail {
            write!(f, " - {}", detail)?;
        }
        Ok(())
    }
}
