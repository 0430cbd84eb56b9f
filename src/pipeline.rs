//! The adaptation pipeline: the single entry point hosts call.
//!
//! `adapt` turns an [`AdaptationRequest`] into shared [`AdaptedContent`]:
//!
//! 1. fingerprint the request
//! 2. return a cached result if one is live
//! 3. otherwise join the in-flight call for the fingerprint, or render the
//!    prompt and start one
//! 4. wait for the shared outcome
//!
//! The result cache and the pending-call table live behind one mutex, so the
//! lookup and the create-or-join decision happen in a single critical
//! section. The lock is never held across an `.await`.
//!
//! Each pending call is driven by its own spawned task. A caller that goes
//! away only withdraws itself; the orchestration stops before its next
//! attempt or backoff once nobody is waiting, and a result that does arrive
//! is still cached.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;

use crate::cache::{CacheEntry, CacheStats, ResultCache};
use crate::config::{ConfigError, PipelineConfig};
use crate::content::AdaptedContent;
use crate::error::{PipelineError, TemplateError};
use crate::fingerprint::{fingerprint, Fingerprint};
use crate::llm::{ProviderId, ProviderRegistry, UsageReport};
use crate::orchestrator::{CallState, Dispatch, PendingCall, RequestOrchestrator};
use crate::prompts::{self, PromptPayload};
use crate::request::{AdaptationRequest, GenerationParameters};

/// Cache and pending calls, guarded together.
struct PipelineState {
    cache: ResultCache,
    pending: HashMap<Fingerprint, Arc<PendingCall>>,
}

impl PipelineState {
    /// Remove the pending entry for `call`, unless it was already replaced by
    /// a newer call for the same fingerprint.
    fn remove_pending(&mut self, call: &Arc<PendingCall>) -> bool {
        match self.pending.get(call.fingerprint()) {
            Some(current) if Arc::ptr_eq(current, call) => {
                self.pending.remove(call.fingerprint());
                true
            }
            _ => false,
        }
    }
}

struct Inner {
    config: PipelineConfig,
    orchestrator: RequestOrchestrator,
    state: Mutex<PipelineState>,
    /// Mirrors `pending.len()`, for shutdown.
    in_flight: watch::Sender<usize>,
    closing: AtomicBool,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether any caller still waits for `call`. Drops the pending entry when
    /// nobody does, so later callers start a fresh call.
    fn still_wanted(&self, call: &Arc<PendingCall>) -> bool {
        let mut state = self.lock_state();
        if call.waiters() > 0 {
            return true;
        }
        if state.remove_pending(call) {
            self.in_flight.send_replace(state.pending.len());
        }
        false
    }

    /// Publish an orchestration's result. Successes are cached even when every
    /// caller has already left.
    fn finish(&self, call: &Arc<PendingCall>, result: Result<AdaptedContent, PipelineError>) {
        let outcome = result.map(Arc::new);
        {
            let mut state = self.lock_state();
            if let Ok(content) = &outcome {
                state
                    .cache
                    .put(call.fingerprint().clone(), Arc::clone(content), None);
            }
            if state.remove_pending(call) {
                self.in_flight.send_replace(state.pending.len());
            }
        }

        match &outcome {
            Ok(_) => tracing::debug!(
                fingerprint = %call.fingerprint().short(),
                waiters = call.waiters(),
                "Publishing adapted content"
            ),
            Err(e) => tracing::debug!(
                fingerprint = %call.fingerprint().short(),
                waiters = call.waiters(),
                error = %e,
                "Publishing failure"
            ),
        }
        call.complete(outcome);
    }
}

/// Completes the call even if the orchestration task panics or is dropped.
struct FinishGuard {
    inner: Arc<Inner>,
    call: Arc<PendingCall>,
    finished: bool,
}

impl FinishGuard {
    fn finish(mut self, result: Result<AdaptedContent, PipelineError>) {
        self.finished = true;
        self.inner.finish(&self.call, result);
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::error!(
                fingerprint = %self.call.fingerprint().short(),
                "Orchestration ended without an outcome"
            );
            self.inner.finish(
                &self.call,
                Err(PipelineError::Exhausted(crate::error::ExhaustedError {
                    fingerprint: self.call.fingerprint().clone(),
                    reason: crate::error::ExhaustionReason::Aborted,
                    attempts: Vec::new(),
                })),
            );
        }
    }
}

/// What a caller does after the critical section.
enum Admission {
    Hit(Arc<AdaptedContent>),
    Wait(crate::orchestrator::Waiter),
}

/// Cached, de-duplicated, retried and validated adaptation.
///
/// Cloning is cheap; clones share the cache and the pending calls.
#[derive(Clone)]
pub struct AdaptationPipeline {
    inner: Arc<Inner>,
}

impl AdaptationPipeline {
    /// Create a pipeline over an already built registry.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if the configuration is invalid.
    pub fn new(config: PipelineConfig, registry: ProviderRegistry) -> Result<Self, ConfigError> {
        config.validate()?;

        let orchestrator = RequestOrchestrator::new(
            Arc::new(registry),
            config.retry_policy(),
            config.max_concurrent_in_flight,
        );
        let state = PipelineState {
            cache: ResultCache::new(config.cache_config()),
            pending: HashMap::new(),
        };
        let (in_flight, _) = watch::channel(0);

        tracing::info!(
            providers = orchestrator.registry().len(),
            max_in_flight = config.max_concurrent_in_flight,
            cache_entries = config.cache_max_entries,
            "Adaptation pipeline ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                orchestrator,
                state: Mutex::new(state),
                in_flight,
                closing: AtomicBool::new(false),
            }),
        })
    }

    /// Create a pipeline, building the providers listed in the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid or a provider
    /// cannot be built (for instance because its API key is not set).
    pub fn from_config(config: PipelineConfig) -> Result<Self, ConfigError> {
        let registry = ProviderRegistry::from_configs(&config.providers)?;
        Self::new(config, registry)
    }

    /// Adapt an assignment for a learner.
    ///
    /// Concurrent calls with the same fingerprint share one orchestration and
    /// receive the same `Arc`. Dropping the returned future withdraws only
    /// this caller.
    ///
    /// # Arguments
    ///
    /// * `request` - Profile, assignment snapshot, project context and
    ///   generation parameters
    ///
    /// # Returns
    ///
    /// The validated content.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the prompt cannot be rendered from the request
    /// - `Exhausted` if every provider and budget was spent
    /// - `ShuttingDown` once [`shutdown`](Self::shutdown) has been called
    pub async fn adapt(&self, request: &AdaptationRequest) -> Result<Arc<AdaptedContent>, PipelineError> {
        let fp = fingerprint(request);
        let render = || prompts::render(request.profile(), request.assignment(), request.context());

        let waiter = match self.admit(&fp, request.parameters(), render)? {
            Admission::Hit(content) => return Ok(content),
            Admission::Wait(waiter) => waiter,
        };
        waiter.wait().await
    }

    /// Like [`adapt`](Self::adapt), but gives up when `cancel` resolves first.
    ///
    /// Cancelling withdraws this caller only; other callers of the same
    /// fingerprint are unaffected.
    pub async fn adapt_until<C>(
        &self,
        request: &AdaptationRequest,
        cancel: C,
    ) -> Result<Arc<AdaptedContent>, PipelineError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            result = self.adapt(request) => result,
            _ = cancel => {
                tracing::debug!("Caller withdrew from adaptation");
                Err(PipelineError::Cancelled)
            }
        }
    }

    /// Decide, under the state lock, whether the caller is served from the
    /// cache, joins the in-flight call, or starts a new one. The prompt is
    /// only rendered in the last case.
    fn admit<R>(
        &self,
        fp: &Fingerprint,
        params: &GenerationParameters,
        render: R,
    ) -> Result<Admission, PipelineError>
    where
        R: FnOnce() -> Result<PromptPayload, TemplateError>,
    {
        let (waiter, call, payload) = {
            let mut state = self.inner.lock_state();

            // Checked under the lock so shutdown never misses a new call.
            if self.inner.closing.load(Ordering::SeqCst) {
                return Err(PipelineError::ShuttingDown);
            }

            if let Some(hit) = state.cache.get(fp) {
                tracing::debug!(fingerprint = %fp.short(), "Cache hit");
                return Ok(Admission::Hit(hit));
            }

            if let Some(call) = state.pending.get(fp) {
                tracing::debug!(
                    fingerprint = %fp.short(),
                    waiters = call.waiters() + 1,
                    "Joining in-flight adaptation"
                );
                return Ok(Admission::Wait(call.join()));
            }

            let payload = render().inspect_err(|e| {
                tracing::warn!(fingerprint = %fp.short(), error = %e, "Rejected adaptation input")
            })?;

            let call = PendingCall::new(fp.clone());
            let waiter = call.join();
            state.pending.insert(fp.clone(), Arc::clone(&call));
            self.inner.in_flight.send_replace(state.pending.len());
            (waiter, call, payload)
        };

        let order = self.resolve_order(params);
        tracing::info!(
            fingerprint = %fp.short(),
            providers = ?order,
            "Starting adaptation"
        );
        self.spawn_orchestration(call, payload, params.clone(), order);
        Ok(Admission::Wait(waiter))
    }

    /// Request order, else configured order, else registration order.
    fn resolve_order(&self, params: &GenerationParameters) -> Vec<ProviderId> {
        if !params.provider_preference_order.is_empty() {
            params.provider_preference_order.clone()
        } else if !self.inner.config.provider_preference_order.is_empty() {
            self.inner.config.provider_preference_order.clone()
        } else {
            self.inner.orchestrator.registry().ids().to_vec()
        }
    }

    fn spawn_orchestration(
        &self,
        call: Arc<PendingCall>,
        payload: PromptPayload,
        params: GenerationParameters,
        order: Vec<ProviderId>,
    ) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let guard = FinishGuard {
                inner: Arc::clone(&inner),
                call: Arc::clone(&call),
                finished: false,
            };

            let dispatch = Dispatch {
                fingerprint: call.fingerprint(),
                payload: &payload,
                params: &params,
                order: &order,
                call: &call,
            };
            let result = inner
                .orchestrator
                .run(dispatch, || inner.still_wanted(&call))
                .await;

            guard.finish(result);
        });
    }

    /// Live cached content for a fingerprint. Does not count as a lookup.
    pub fn cached(&self, fingerprint: &Fingerprint) -> Option<Arc<AdaptedContent>> {
        self.inner
            .lock_state()
            .cache
            .peek(fingerprint)
            .map(|entry| Arc::clone(&entry.content))
    }

    /// Drop one cached result. Returns whether it existed.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.lock_state().cache.invalidate(fingerprint)
    }

    /// Drop every cached result matching the predicate.
    pub fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: FnMut(&CacheEntry) -> bool,
    {
        let removed = self.inner.lock_state().cache.invalidate_where(predicate);
        if removed > 0 {
            tracing::info!(removed, "Invalidated cached adaptations");
        }
        removed
    }

    /// Drop expired cache entries.
    pub fn purge_expired(&self) -> usize {
        self.inner.lock_state().cache.purge_expired()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.lock_state().cache.stats()
    }

    /// Per-provider attempt and token counters.
    pub fn usage_report(&self) -> UsageReport {
        self.inner.orchestrator.usage().report()
    }

    /// Number of fingerprints with an orchestration in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    /// Lifecycle state of the in-flight call for a fingerprint, if any.
    pub fn call_state(&self, fingerprint: &Fingerprint) -> Option<CallState> {
        self.inner
            .lock_state()
            .pending
            .get(fingerprint)
            .map(|call| call.state())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        self.inner.orchestrator.registry()
    }

    /// Stop admitting requests and wait for in-flight calls to drain.
    ///
    /// # Arguments
    ///
    /// * `grace` - Upper bound on the wait
    ///
    /// # Errors
    ///
    /// Returns `ShutdownTimeout` with the number of calls still in flight if
    /// they did not drain within `grace`.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), PipelineError> {
        let mut drained = {
            // Under the lock, so every admitted call is already counted.
            let _state = self.inner.lock_state();
            if !self.inner.closing.swap(true, Ordering::SeqCst) {
                tracing::info!(grace_ms = grace.as_millis() as u64, "Shutting down adaptation pipeline");
            }
            self.inner.in_flight.subscribe()
        };

        let waited = tokio::time::timeout(grace, drained.wait_for(|n| *n == 0))
            .await
            .map(|_| ());
        match waited {
            Ok(()) => {
                tracing::info!("Adaptation pipeline drained");
                Ok(())
            }
            Err(_) => {
                let remaining = self.in_flight();
                tracing::warn!(remaining, "Shutdown grace period elapsed");
                Err(PipelineError::ShutdownTimeout(grace, remaining))
            }
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for AdaptationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptationPipeline")
            .field("registry", self.registry())
            .field("in_flight", &self.in_flight())
            .field("closing", &self.is_closing())
            .finish()
    }
}
