//! Request orchestration: retries, backoff, fallback, repair and deadlines.
//!
//! For one fingerprint the orchestrator walks the provider preference order.
//! Each provider gets a fresh transport budget and a fresh backoff schedule:
//!
//! - retryable failures back off and retry the same provider until its
//!   `max_attempts_per_provider` is spent, then fall over to the next one
//! - fatal failures fall over immediately, without backoff
//! - output that fails validation is re-asked once per unit of the separate
//!   repair budget, against the same provider and without backoff
//!
//! Attempts are strictly sequential. No attempt or backoff sleep extends past
//! the overall deadline, and every attempt is bounded by the per-attempt
//! timeout. Before each attempt and each backoff the orchestrator checks
//! whether anyone still wants the result.

pub mod attempt;
pub mod backoff;
pub mod pending;

pub use attempt::{AttemptClass, AttemptKind, AttemptRecord, ProviderAttempt};
pub use backoff::{BackoffError, BackoffPolicy, BackoffSchedule};
pub use pending::{CallOutcome, CallState, PendingCall, Waiter};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};

use crate::content::AdaptedContent;
use crate::error::{ExhaustedError, ExhaustionReason, PipelineError};
use crate::fingerprint::Fingerprint;
use crate::llm::{
    AttemptOutcome, FailureClass, ProviderAdapter, ProviderFailure, ProviderId,
    ProviderRegistry, UsageTracker,
};
use crate::prompts::PromptPayload;
use crate::request::GenerationParameters;
use crate::validation::ResponseValidator;

/// Budgets and deadlines applied to each orchestration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Transport attempts per provider before falling over (at least 1).
    pub max_attempts_per_provider: u32,
    /// Re-asks after invalid output, per provider.
    pub repair_attempt_budget: u32,
    pub backoff: BackoffPolicy,
    /// Bound on a single provider call.
    pub per_attempt_timeout: Duration,
    /// Bound on the whole orchestration, across providers.
    pub overall_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_provider: 3,
            repair_attempt_budget: 1,
            backoff: BackoffPolicy::default(),
            per_attempt_timeout: Duration::from_secs(30),
            overall_timeout: Duration::from_secs(120),
        }
    }
}

/// Everything one orchestration needs besides the shared orchestrator.
pub struct Dispatch<'a> {
    pub fingerprint: &'a Fingerprint,
    pub payload: &'a PromptPayload,
    pub params: &'a GenerationParameters,
    pub order: &'a [ProviderId],
    pub call: &'a PendingCall,
}

/// How one provider's turn ended.
enum ProviderTurn {
    Done(AdaptedContent),
    Next,
    Stop(StopReason),
}

enum StopReason {
    Deadline,
    Cancelled,
}

/// Drives provider attempts for pending calls.
pub struct RequestOrchestrator {
    registry: Arc<ProviderRegistry>,
    validator: ResponseValidator,
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
    usage: Arc<UsageTracker>,
}

impl RequestOrchestrator {
    /// Create an orchestrator.
    ///
    /// # Arguments
    ///
    /// * `registry` - Providers available for dispatch
    /// * `policy` - Budgets and deadlines
    /// * `max_concurrent_in_flight` - Provider calls allowed at once, across
    ///   all fingerprints
    pub fn new(
        registry: Arc<ProviderRegistry>,
        policy: RetryPolicy,
        max_concurrent_in_flight: usize,
    ) -> Self {
        Self {
            registry,
            validator: ResponseValidator::new(),
            policy,
            permits: Arc::new(Semaphore::new(max_concurrent_in_flight.max(1))),
            usage: Arc::new(UsageTracker::new()),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Run one orchestration to completion.
    ///
    /// # Arguments
    ///
    /// * `dispatch` - Fingerprint, payload, parameters, provider order and the
    ///   pending call whose state is published
    /// * `still_wanted` - Checked before every attempt and backoff; returning
    ///   `false` ends the orchestration with `Cancelled`
    ///
    /// # Returns
    ///
    /// Validated content, `PipelineError::Exhausted` carrying every attempt's
    /// classification, or `PipelineError::Cancelled`.
    pub async fn run<F>(&self, dispatch: Dispatch<'_>, still_wanted: F) -> Result<AdaptedContent, PipelineError>
    where
        F: Fn() -> bool + Sync,
    {
        let deadline = Instant::now() + self.policy.overall_timeout;
        let mut trail: Vec<AttemptRecord> = Vec::new();
        let fp = dispatch.fingerprint;

        if dispatch.order.is_empty() {
            tracing::warn!(fingerprint = %fp.short(), "No providers in preference order");
            return Err(exhausted(fp, ExhaustionReason::NoProviders, trail));
        }

        dispatch.call.set_state(CallState::Dispatched);

        for provider_id in dispatch.order {
            let Some(adapter) = self.registry.get(provider_id) else {
                tracing::warn!(
                    fingerprint = %fp.short(),
                    provider = %provider_id,
                    "Skipping unknown provider"
                );
                trail.push(ProviderAttempt::transport(provider_id.clone(), 1).finish(
                    AttemptClass::Fatal(FailureClass::UnknownProvider),
                    Some("provider is not registered".to_string()),
                    Duration::ZERO,
                ));
                continue;
            };

            if !trail.is_empty() {
                dispatch.call.set_state(CallState::Retrying);
                tracing::info!(
                    fingerprint = %fp.short(),
                    provider = %provider_id,
                    "Falling back to next provider"
                );
            }

            match self
                .run_provider(adapter.as_ref(), &dispatch, deadline, &mut trail, &still_wanted)
                .await
            {
                ProviderTurn::Done(content) => {
                    tracing::info!(
                        fingerprint = %fp.short(),
                        provider = %provider_id,
                        attempts = trail.len(),
                        "Adaptation succeeded"
                    );
                    return Ok(content);
                }
                ProviderTurn::Next => continue,
                ProviderTurn::Stop(StopReason::Deadline) => {
                    tracing::warn!(
                        fingerprint = %fp.short(),
                        attempts = trail.len(),
                        "Overall deadline exceeded"
                    );
                    return Err(exhausted(fp, ExhaustionReason::DeadlineExceeded, trail));
                }
                ProviderTurn::Stop(StopReason::Cancelled) => {
                    tracing::info!(
                        fingerprint = %fp.short(),
                        attempts = trail.len(),
                        "No waiters left, stopping orchestration"
                    );
                    return Err(PipelineError::Cancelled);
                }
            }
        }

        let error = ExhaustedError {
            fingerprint: fp.clone(),
            reason: ExhaustionReason::ProvidersExhausted,
            attempts: trail,
        };
        tracing::warn!(fingerprint = %fp.short(), trail = %error.summary(), "All providers exhausted");
        Err(PipelineError::Exhausted(error))
    }

    async fn run_provider<F>(
        &self,
        adapter: &dyn ProviderAdapter,
        dispatch: &Dispatch<'_>,
        deadline: Instant,
        trail: &mut Vec<AttemptRecord>,
        still_wanted: &F,
    ) -> ProviderTurn
    where
        F: Fn() -> bool + Sync,
    {
        let provider_id = adapter.id().clone();
        let fp = dispatch.fingerprint;
        let schedule = self.policy.backoff.schedule();
        let max_attempts = self.policy.max_attempts_per_provider.max(1);

        let mut dispatched = 0u32;
        let mut transport_used = 0u32;
        let mut repairs_used = 0u32;
        let mut repair_payload: Option<PromptPayload> = None;

        loop {
            if !still_wanted() {
                return ProviderTurn::Stop(StopReason::Cancelled);
            }
            if Instant::now() >= deadline {
                return ProviderTurn::Stop(StopReason::Deadline);
            }

            let permit = match timeout_at(deadline, self.permits.acquire()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return ProviderTurn::Stop(StopReason::Cancelled),
                Err(_) => return ProviderTurn::Stop(StopReason::Deadline),
            };
            if !still_wanted() {
                return ProviderTurn::Stop(StopReason::Cancelled);
            }

            dispatched += 1;
            let attempt = match repair_payload {
                Some(_) => ProviderAttempt::repair(provider_id.clone(), dispatched),
                None => ProviderAttempt::transport(provider_id.clone(), dispatched),
            };
            let payload = repair_payload.as_ref().unwrap_or(dispatch.payload);

            tracing::debug!(
                fingerprint = %fp.short(),
                provider = %provider_id,
                attempt = dispatched,
                kind = ?attempt.kind,
                "Dispatching provider attempt"
            );

            let started = Instant::now();
            let attempt_deadline = (started + self.policy.per_attempt_timeout).min(deadline);
            let outcome = match timeout_at(attempt_deadline, adapter.send(payload, dispatch.params)).await
            {
                Ok(outcome) => outcome,
                Err(_) => AttemptOutcome::Retryable(ProviderFailure::new(
                    FailureClass::Timeout,
                    format!(
                        "no response within {}ms",
                        attempt_deadline.duration_since(started).as_millis()
                    ),
                )),
            };
            drop(permit);
            let elapsed = started.elapsed();
            self.usage.record(&provider_id, &outcome);

            if attempt.kind == AttemptKind::Transport || matches!(outcome, AttemptOutcome::Retryable(_)) {
                transport_used += 1;
            }

            match outcome {
                AttemptOutcome::Success(reply) => {
                    let (result, repairs) = self.validator.validate_with_log(&reply.output);
                    match result {
                        Ok(content) => {
                            if !repairs.is_empty() {
                                tracing::debug!(
                                    fingerprint = %fp.short(),
                                    provider = %provider_id,
                                    repairs = repairs.len(),
                                    "Accepted output after local repairs"
                                );
                            }
                            trail.push(attempt.finish(AttemptClass::Succeeded, None, elapsed));
                            return ProviderTurn::Done(content);
                        }
                        Err(invalid) => {
                            tracing::warn!(
                                fingerprint = %fp.short(),
                                provider = %provider_id,
                                attempt = dispatched,
                                error = %invalid,
                                "Provider output failed validation"
                            );
                            trail.push(attempt.finish(
                                AttemptClass::InvalidOutput,
                                Some(invalid.to_string()),
                                elapsed,
                            ));
                            if repairs_used >= self.policy.repair_attempt_budget {
                                return ProviderTurn::Next;
                            }
                            repairs_used += 1;
                            repair_payload = Some(dispatch.payload.with_repair_note(&invalid));
                            dispatch.call.set_state(CallState::Retrying);
                        }
                    }
                }
                AttemptOutcome::Retryable(failure) => {
                    tracing::warn!(
                        fingerprint = %fp.short(),
                        provider = %provider_id,
                        attempt = dispatched,
                        max_attempts = max_attempts,
                        error = %failure,
                        "Retryable provider failure"
                    );
                    trail.push(attempt.finish(
                        AttemptClass::Retryable(failure.class),
                        Some(failure.message),
                        elapsed,
                    ));
                    // An attempt cut short by the overall deadline ends the
                    // orchestration, even on the provider's last attempt.
                    if Instant::now() >= deadline {
                        return ProviderTurn::Stop(StopReason::Deadline);
                    }
                    if transport_used >= max_attempts {
                        return ProviderTurn::Next;
                    }

                    let delay = schedule.delay_for_retry(transport_used);
                    let wake_at = Instant::now() + delay;
                    if wake_at >= deadline {
                        return ProviderTurn::Stop(StopReason::Deadline);
                    }
                    if !still_wanted() {
                        return ProviderTurn::Stop(StopReason::Cancelled);
                    }

                    dispatch.call.set_state(CallState::Retrying);
                    tracing::debug!(
                        fingerprint = %fp.short(),
                        provider = %provider_id,
                        delay_ms = delay.as_millis() as u64,
                        "Backing off before retry"
                    );
                    if !backoff_until(wake_at, dispatch.call, still_wanted).await {
                        return ProviderTurn::Stop(StopReason::Cancelled);
                    }
                }
                AttemptOutcome::Fatal(failure) => {
                    tracing::warn!(
                        fingerprint = %fp.short(),
                        provider = %provider_id,
                        error = %failure,
                        "Fatal provider failure"
                    );
                    trail.push(attempt.finish(
                        AttemptClass::Fatal(failure.class),
                        Some(failure.message),
                        elapsed,
                    ));
                    return ProviderTurn::Next;
                }
            }
        }
    }
}

/// Sleep until `wake_at`, returning `false` early if every waiter leaves.
async fn backoff_until<F>(wake_at: Instant, call: &PendingCall, still_wanted: &F) -> bool
where
    F: Fn() -> bool + Sync,
{
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(wake_at) => return true,
            _ = call.abandoned() => {
                if !still_wanted() {
                    return false;
                }
            }
        }
    }
}

fn exhausted(
    fingerprint: &Fingerprint,
    reason: ExhaustionReason,
    attempts: Vec<AttemptRecord>,
) -> PipelineError {
    PipelineError::Exhausted(ExhaustedError {
        fingerprint: fingerprint.clone(),
        reason,
        attempts,
    })
}
