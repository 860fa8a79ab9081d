//! Single-flight coordination of access token refreshes.
//!
//! The first request that needs a refresh becomes the leader and performs it.
//! Requests failing authorization while the leader is busy are parked as
//! [`PendingRequest`]s and woken, in arrival order, with the leader's outcome.
//! Every finished cycle bumps a generation counter, so a request sent before
//! that cycle ended reuses its outcome instead of leading another refresh.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::error::GatewayError;

/// What a parked request receives: the new access token, or why there is none.
pub type RefreshOutcome = Result<String, GatewayError>;

/// A request waiting for the in-flight refresh to resolve.
struct PendingRequest {
    request_id: Uuid,
    reply: oneshot::Sender<RefreshOutcome>,
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    /// Only ever non-empty while `refreshing` is true.
    pending: VecDeque<PendingRequest>,
    /// Number of finished refresh cycles.
    generation: u64,
    /// Outcome of the most recent finished cycle.
    last: Option<RefreshOutcome>,
}

/// The caller's role in the current refresh cycle.
pub enum Ticket<'a> {
    /// No refresh was in flight; this caller must perform it and then complete the lease.
    Leader(RefreshLease<'a>),
    /// A refresh is in flight; await its outcome.
    Follower(oneshot::Receiver<RefreshOutcome>),
    /// A refresh finished after the request went out; use its outcome.
    Completed(RefreshOutcome),
}

/// Owns the refresh flag and the queue of parked requests.
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        RefreshCoordinator::default()
    }

    // The state is left consistent at every unlock, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check-and-set the refresh flag in one step.
    ///
    /// `seen_generation` is [`RefreshCoordinator::generation`] as it was when
    /// the failed request was sent.
    pub fn acquire(&self, request_id: Uuid, seen_generation: u64) -> Ticket<'_> {
        let mut state = self.lock();
        if state.refreshing {
            let (reply, waiter) = oneshot::channel();
            state.pending.push_back(PendingRequest { request_id, reply });
            debug!(
                %request_id,
                position = state.pending.len(),
                "Refresh in flight, request queued"
            );
            return Ticket::Follower(waiter);
        }

        if state.generation != seen_generation {
            if let Some(outcome) = state.last.clone() {
                debug!(%request_id, "Refresh already finished since the request was sent");
                return Ticket::Completed(outcome);
            }
        }

        state.refreshing = true;
        debug!(%request_id, "Request leads a new refresh");
        Ticket::Leader(RefreshLease {
            coordinator: self,
            released: false,
        })
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    pub fn pending_requests(&self) -> usize {
        self.lock().pending.len()
    }

    /// Clear the flag and hand `outcome` to every parked request, oldest first.
    ///
    /// Returns the ids of the woken requests in the order they were woken.
    fn release(&self, outcome: RefreshOutcome) -> Vec<Uuid> {
        let drained = {
            let mut state = self.lock();
            state.refreshing = false;
            state.generation += 1;
            state.last = Some(outcome.clone());
            std::mem::take(&mut state.pending)
        };

        let mut woken = Vec::with_capacity(drained.len());
        for pending in drained {
            if pending.reply.send(outcome.clone()).is_err() {
                debug!(request_id = %pending.request_id, "Queued request was dropped before replay");
            }
            woken.push(pending.request_id);
        }
        woken
    }
}

/// Proof of leadership over one refresh cycle.
///
/// Dropping a lease without completing it (e.g. the leading task was
/// cancelled) clears the flag and rejects every parked request.
pub struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    released: bool,
}

impl RefreshLease<'_> {
    /// Finish the cycle with `outcome`, waking parked requests oldest first.
    /// Returns the ids of the woken requests.
    pub fn complete(mut self, outcome: RefreshOutcome) -> Vec<Uuid> {
        self.released = true;
        self.coordinator.release(outcome)
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.coordinator.release(Err(GatewayError::RefreshFailed(
                "refresh was abandoned before completing".to_string(),
            )));
        }
    }
}
