//! Exponential backoff with jitter.
//!
//! Delay before retry `n` (1-indexed) is
//! `min(base * multiplier^(n-1) * (1 + j), cap)`, where the jitter factor `j`
//! is drawn once from `[0, jitter]` per provider schedule. Drawing it once
//! keeps the delays of one schedule non-decreasing up to the cap while still
//! spreading concurrent schedules apart.

use std::time::Duration;

use rand::RngExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A backoff policy that cannot produce a sane schedule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackoffError {
    #[error("backoff.multiplier must be a finite number >= 1.0, got {0}")]
    Multiplier(f64),

    #[error("backoff.jitter must be between 0.0 and 1.0, got {0}")]
    Jitter(f64),

    #[error("backoff.cap_ms ({cap_ms}) must be >= backoff.base_ms ({base_ms})")]
    CapBelowBase { base_ms: u64, cap_ms: u64 },
}

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry, in milliseconds.
    pub base_ms: u64,
    /// Growth factor per retry (at least 1.0).
    pub multiplier: f64,
    /// Upper bound on any delay, in milliseconds.
    pub cap_ms: u64,
    /// Maximum jitter fraction added on top of the delay (0.0 - 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 500,
            multiplier: 2.0,
            cap_ms: 8_000,
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// Policy without jitter, for deterministic schedules.
    pub fn fixed(base_ms: u64, multiplier: f64, cap_ms: u64) -> Self {
        Self {
            base_ms,
            multiplier,
            cap_ms,
            jitter: 0.0,
        }
    }

    /// Check the policy's invariants.
    ///
    /// # Errors
    ///
    /// Returns the first `BackoffError` found.
    pub fn validate(&self) -> Result<(), BackoffError> {
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return Err(BackoffError::Multiplier(self.multiplier));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(BackoffError::Jitter(self.jitter));
        }
        if self.cap_ms < self.base_ms {
            return Err(BackoffError::CapBelowBase {
                base_ms: self.base_ms,
                cap_ms: self.cap_ms,
            });
        }
        Ok(())
    }

    /// Start a schedule with a freshly sampled jitter factor.
    pub fn schedule(&self) -> BackoffSchedule {
        let factor = if self.jitter > 0.0 {
            rand::rng().random_range(0.0..=self.jitter)
        } else {
            0.0
        };
        BackoffSchedule {
            policy: self.clone(),
            jitter_factor: factor,
        }
    }

    /// Delay before retry `retry` for a given jitter factor.
    pub fn delay_with_factor(&self, retry: u32, jitter_factor: f64) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_ms as f64 * self.multiplier.powi(exponent) * (1.0 + jitter_factor);
        let capped = raw.min(self.cap_ms as f64);
        Duration::from_millis(capped.max(0.0).round() as u64)
    }
}

/// Backoff delays for one (call, provider) pair.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    policy: BackoffPolicy,
    jitter_factor: f64,
}

impl BackoffSchedule {
    /// Delay before retry `retry` (1 = first retry).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.policy.delay_with_factor(retry, self.jitter_factor)
    }

    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }
}
