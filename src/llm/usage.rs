//! Per-provider usage accounting.
//!
//! Every provider call consumes one unit of rate budget. The orchestrator
//! records each attempt here; adapters never throttle themselves. Counters
//! are atomics so the hot path never takes a write lock once a provider has
//! been seen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{AttemptOutcome, ProviderId, TokenUsage};

/// Counters for one provider.
#[derive(Debug, Default)]
struct ProviderCounters {
    calls: AtomicU64,
    successes: AtomicU64,
    retryable_failures: AtomicU64,
    fatal_failures: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

/// Snapshot of one provider's usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderUsage {
    /// Calls made (each consumes one unit of rate budget).
    pub calls: u64,
    pub successes: u64,
    pub retryable_failures: u64,
    pub fatal_failures: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl ProviderUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Summary report of usage across all providers.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    /// When tracking started.
    pub since: DateTime<Utc>,
    pub total_calls: u64,
    pub by_provider: HashMap<ProviderId, ProviderUsage>,
}

impl UsageReport {
    /// Total tokens across all providers.
    pub fn total_tokens(&self) -> u64 {
        self.by_provider.values().map(ProviderUsage::total_tokens).sum()
    }
}

/// Thread-safe usage tracker shared by all orchestrations of a pipeline.
#[derive(Debug)]
pub struct UsageTracker {
    since: DateTime<Utc>,
    total_calls: AtomicU64,
    by_provider: RwLock<HashMap<ProviderId, Arc<ProviderCounters>>>,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            since: Utc::now(),
            total_calls: AtomicU64::new(0),
            by_provider: RwLock::new(HashMap::new()),
        }
    }

    /// Record the outcome of one provider call.
    ///
    /// # Arguments
    ///
    /// * `provider` - Provider that was called
    /// * `outcome` - Classified outcome of the call
    pub fn record(&self, provider: &ProviderId, outcome: &AttemptOutcome) {
        let counters = self.counters_for(provider);

        self.total_calls.fetch_add(1, Ordering::SeqCst);
        counters.calls.fetch_add(1, Ordering::SeqCst);

        match outcome {
            AttemptOutcome::Success(reply) => {
                counters.successes.fetch_add(1, Ordering::SeqCst);
                if let Some(usage) = reply.usage {
                    self.add_tokens(&counters, usage);
                }
            }
            AttemptOutcome::Retryable(_) => {
                counters.retryable_failures.fetch_add(1, Ordering::SeqCst);
            }
            AttemptOutcome::Fatal(_) => {
                counters.fatal_failures.fetch_add(1, Ordering::SeqCst);
            }
        }

        tracing::debug!(
            provider = %provider,
            success = outcome.is_success(),
            "Recorded provider call"
        );
    }

    /// Total calls across all providers.
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Usage of one provider, if it was ever called.
    pub fn provider_usage(&self, provider: &ProviderId) -> Option<ProviderUsage> {
        let map = self.by_provider.read().unwrap_or_else(PoisonError::into_inner);
        map.get(provider).map(|c| snapshot(c))
    }

    /// Snapshot of every counter.
    pub fn report(&self) -> UsageReport {
        let map = self.by_provider.read().unwrap_or_else(PoisonError::into_inner);
        UsageReport {
            since: self.since,
            total_calls: self.total_calls(),
            by_provider: map
                .iter()
                .map(|(id, c)| (id.clone(), snapshot(c)))
                .collect(),
        }
    }

    fn add_tokens(&self, counters: &ProviderCounters, usage: TokenUsage) {
        counters
            .prompt_tokens
            .fetch_add(u64::from(usage.prompt_tokens), Ordering::SeqCst);
        counters
            .completion_tokens
            .fetch_add(u64::from(usage.completion_tokens), Ordering::SeqCst);
    }

    fn counters_for(&self, provider: &ProviderId) -> Arc<ProviderCounters> {
        {
            let map = self.by_provider.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(counters) = map.get(provider) {
                return Arc::clone(counters);
            }
        }
        let mut map = self.by_provider.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(provider.clone()).or_default())
    }
}

fn snapshot(c: &ProviderCounters) -> ProviderUsage {
    ProviderUsage {
        calls: c.calls.load(Ordering::SeqCst),
        successes: c.successes.load(Ordering::SeqCst),
        retryable_failures: c.retryable_failures.load(Ordering::SeqCst),
        fatal_failures: c.fatal_failures.load(Ordering::SeqCst),
        prompt_tokens: c.prompt_tokens.load(Ordering::SeqCst),
        completion_tokens: c.completion_tokens.load(Ordering::SeqCst),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{FailureClass, ProviderFailure, ProviderReply};

    #[test]
    fn test_usage_tracker_new() {
        let tracker = UsageTracker::new();
        assert_eq!(tracker.total_calls(), 0);
        assert!(tracker.report().by_provider.is_empty());
    }

    #[test]
    fn test_record_outcomes() {
        let tracker = UsageTracker::new();
        let a = ProviderId::from("a");
        let b = ProviderId::from("b");

        let reply = ProviderReply::text("{}").with_usage(TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 40,
        });
        tracker.record(&a, &AttemptOutcome::Success(reply));
        tracker.record(
            &a,
            &AttemptOutcome::Retryable(ProviderFailure::new(FailureClass::Timeout, "slow")),
        );
        tracker.record(
            &b,
            &AttemptOutcome::Fatal(ProviderFailure::from_status(401, "no")),
        );

        assert_eq!(tracker.total_calls(), 3);

        let usage_a = tracker.provider_usage(&a).expect("a recorded");
        assert_eq!(usage_a.calls, 2);
        assert_eq!(usage_a.successes, 1);
        assert_eq!(usage_a.retryable_failures, 1);
        assert_eq!(usage_a.total_tokens(), 140);

        let usage_b = tracker.provider_usage(&b).expect("b recorded");
        assert_eq!(usage_b.fatal_failures, 1);

        let report = tracker.report();
        assert_eq!(report.total_calls, 3);
        assert_eq!(report.total_tokens(), 140);
        assert!(tracker.provider_usage(&ProviderId::from("c")).is_none());
    }
}
