//! In-flight orchestrations shared by every caller of one fingerprint.
//!
//! A [`PendingCall`] owns a single outcome slot. Each caller holds a
//! [`Waiter`]; dropping a waiter (for instance because the caller's future
//! was cancelled) withdraws that caller without disturbing the others. When
//! the last waiter leaves, the orchestration is notified so it can stop
//! before its next attempt or backoff.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

use crate::content::AdaptedContent;
use crate::error::{ExhaustedError, ExhaustionReason, PipelineError};
use crate::fingerprint::Fingerprint;

/// Result delivered to every waiter of a call.
pub type CallOutcome = Result<Arc<AdaptedContent>, PipelineError>;

/// Lifecycle of one orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    Dispatched,
    Retrying,
    Succeeded,
    Failed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One in-flight orchestration for a fingerprint.
#[derive(Debug)]
pub struct PendingCall {
    fingerprint: Fingerprint,
    state: watch::Sender<CallState>,
    outcome: watch::Sender<Option<CallOutcome>>,
    waiters: AtomicUsize,
    abandoned: Notify,
    created_at: Instant,
}

impl PendingCall {
    pub(crate) fn new(fingerprint: Fingerprint) -> Arc<Self> {
        let (state, _) = watch::channel(CallState::Idle);
        let (outcome, _) = watch::channel(None);
        Arc::new(Self {
            fingerprint,
            state,
            outcome,
            waiters: AtomicUsize::new(0),
            abandoned: Notify::new(),
            created_at: Instant::now(),
        })
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    /// Receiver observing lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<CallState> {
        self.state.subscribe()
    }

    /// Number of callers still waiting for the outcome.
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Whether an outcome has been published.
    pub fn is_complete(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Register a new waiter. Must be called while the pending table is locked
    /// so that joins and the last-waiter check are ordered.
    pub(crate) fn join(self: &Arc<Self>) -> Waiter {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        Waiter {
            call: Arc::clone(self),
            outcome: self.outcome.subscribe(),
        }
    }

    pub(crate) fn set_state(&self, state: CallState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::trace!(
                fingerprint = %self.fingerprint.short(),
                from = ?previous,
                to = ?state,
                "Call state transition"
            );
        }
    }

    /// Publish the outcome. Only the first outcome is kept.
    pub(crate) fn complete(&self, outcome: CallOutcome) {
        let state = if outcome.is_ok() {
            CallState::Succeeded
        } else {
            CallState::Failed
        };
        let published = self.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
        if published {
            self.set_state(state);
        }
    }

    /// Resolves when the waiter count drops to zero. May resolve spuriously;
    /// callers re-check under the pending-table lock.
    pub(crate) async fn abandoned(&self) {
        self.abandoned.notified().await
    }
}

/// A caller's handle on a pending call.
#[derive(Debug)]
pub struct Waiter {
    call: Arc<PendingCall>,
    outcome: watch::Receiver<Option<CallOutcome>>,
}

impl Waiter {
    pub fn call(&self) -> &Arc<PendingCall> {
        &self.call
    }

    /// Wait for the shared outcome.
    pub async fn wait(mut self) -> CallOutcome {
        let result = self
            .outcome
            .wait_for(Option::is_some)
            .await
            .map(|slot| slot.clone());

        match result {
            Ok(Some(outcome)) => outcome,
            _ => Err(PipelineError::Exhausted(ExhaustedError {
                fingerprint: self.call.fingerprint.clone(),
                reason: ExhaustionReason::Aborted,
                attempts: Vec::new(),
            })),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if self.call.waiters.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.call.abandoned.notify_one();
        }
    }
}
