//! The state container owning the current snapshot.
//!
//! A [`StateStore`] holds the [`Causes`], recomputes the [`UiSnapshot`] when
//! a cause observably changes, and publishes to subscribers only when the
//! new snapshot differs structurally from the last published one.
//!
//! The store is deliberately not `Sync`: all access is serialized by
//! construction on one execution context (the UI context in the client),
//! so no locking exists here. Asynchronous producers marshal their results onto
//! that context before calling a setter.
//!
//! Batching (`begin_batch`/`end_batch`) coalesces any number of cause
//! mutations into at most one recompute and one publish. Subscriptions are
//! explicit tokens released via [`StateStore::unsubscribe`]; nothing depends
//! on drop timing.

use chrono::{DateTime, Utc};

use crate::derive::{build_snapshot, Causes, DerivationConfig};
use crate::snapshot::UiSnapshot;
use crate::status::{InfectionStatus, SyncError, TrackingStatus};

/// Clock used for escalation timing; injectable for tests.
pub type Clock = Box<dyn Fn() -> DateTime<Utc>>;

type Callback = Box<dyn FnMut(&UiSnapshot)>;

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken(u64);

/// Owns the causes and the derived snapshot.
pub struct StateStore {
    causes: Causes,
    config: DerivationConfig,
    snapshot: UiSnapshot,
    subscribers: Vec<(u64, Callback)>,
    next_token: u64,
    batch_depth: u32,
    batch_dirty: bool,
    clock: Clock,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("causes", &self.causes)
            .field("snapshot", &self.snapshot)
            .field("subscribers", &self.subscribers.len())
            .field("batch_depth", &self.batch_depth)
            .finish_non_exhaustive()
    }
}

impl StateStore {
    /// Create a store with the wall clock.
    #[must_use]
    pub fn new(config: DerivationConfig) -> Self {
        Self::with_clock(config, Box::new(Utc::now))
    }

    /// Create a store with an injected clock.
    #[must_use]
    pub fn with_clock(config: DerivationConfig, clock: Clock) -> Self {
        Self {
            causes: Causes::new(),
            config,
            snapshot: UiSnapshot::default(),
            subscribers: Vec::new(),
            next_token: 0,
            batch_depth: 0,
            batch_dirty: false,
            clock,
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &UiSnapshot {
        &self.snapshot
    }

    /// Read access to the current causes.
    #[must_use]
    pub fn causes(&self) -> &Causes {
        &self.causes
    }

    // =========================================================================
    // CAUSE SETTERS
    // =========================================================================

    /// Tracking status delivered by the proximity SDK. Overwrites wholesale.
    pub fn set_tracking_status(&mut self, status: TrackingStatus) {
        self.set_cause(|causes| causes.tracking = Some(status));
    }

    /// Infection status delivered by the proximity SDK.
    pub fn set_infection_status(&mut self, status: InfectionStatus) {
        self.set_cause(|causes| causes.infection = Some(status));
    }

    /// Debug-only infection override; honoured only when the derivation
    /// config allows it.
    pub fn set_infection_override(&mut self, status: Option<InfectionStatus>) {
        self.set_cause(|causes| causes.infection_override = status);
    }

    /// Result of the push-permission query.
    pub fn set_push_ok(&mut self, push_ok: bool) {
        self.set_cause(|causes| causes.push_ok = push_ok);
    }

    /// Whether background refresh is available.
    pub fn set_background_refresh_available(&mut self, available: bool) {
        self.set_cause(|causes| causes.background_refresh_available = available);
    }

    /// The user's tracing toggle.
    pub fn set_tracing_enabled(&mut self, enabled: bool) {
        self.set_cause(|causes| causes.tracing_enabled = enabled);
    }

    /// Record a failed sync attempt. A time-inconsistency failure also sets
    /// the sticky flag.
    pub fn record_sync_failure(&mut self, error: SyncError) {
        let now = (self.clock)();
        self.set_cause(|causes| {
            causes.sync_history.record_failure(error, now);
            if error == SyncError::TimeInconsistency {
                causes.time_inconsistency = true;
            }
        });
    }

    /// Record a fully successful sync, clearing the error streak and the
    /// sticky time-inconsistency flag.
    pub fn record_sync_success(&mut self) {
        self.set_cause(|causes| {
            causes.sync_history.record_success();
            causes.time_inconsistency = false;
        });
    }

    /// When the user last completed a hotline call.
    pub fn set_last_phone_call(&mut self, at: DateTime<Utc>) {
        self.set_cause(|causes| causes.last_phone_call_at = Some(at));
    }

    /// Associate a completed call with a report identifier.
    pub fn mark_report_called(&mut self, identifier: impl Into<String>) {
        let identifier = identifier.into();
        self.set_cause(|causes| {
            causes.called_report_ids.insert(identifier);
        });
    }

    /// Restore persisted cause fields in one batch (sync-error history,
    /// sticky flag, call records).
    pub fn restore_persisted(
        &mut self,
        sync_history: crate::status::SyncErrorHistory,
        time_inconsistency: bool,
        last_phone_call_at: Option<DateTime<Utc>>,
        called_report_ids: std::collections::BTreeSet<String>,
    ) {
        self.begin_batch();
        self.set_cause(|causes| {
            causes.sync_history = sync_history;
            causes.time_inconsistency = time_inconsistency;
            causes.last_phone_call_at = last_phone_call_at;
            causes.called_report_ids = called_report_ids;
        });
        self.end_batch();
    }

    /// Apply a mutation and recompute if the causes observably changed.
    fn set_cause<F: FnOnce(&mut Causes)>(&mut self, mutate: F) {
        let before = self.causes.clone();
        mutate(&mut self.causes);
        if self.causes == before {
            return;
        }

        if self.batch_depth > 0 {
            self.batch_dirty = true;
        } else {
            self.recompute_and_publish();
        }
    }

    // =========================================================================
    // BATCHING
    // =========================================================================

    /// Open a batch; nestable.
    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Close a batch. The outermost close performs at most one
    /// recompute+publish for all contained mutations.
    pub fn end_batch(&mut self) {
        debug_assert!(self.batch_depth > 0, "end_batch without begin_batch");
        if self.batch_depth == 0 {
            return;
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 && self.batch_dirty {
            self.batch_dirty = false;
            self.recompute_and_publish();
        }
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Register an observer. The current snapshot is delivered synchronously
    /// before this returns.
    pub fn subscribe<F>(&mut self, mut callback: F) -> SubscriptionToken
    where
        F: FnMut(&UiSnapshot) + 'static,
    {
        callback(&self.snapshot);
        self.next_token += 1;
        let token = self.next_token;
        self.subscribers.push((token, Box::new(callback)));
        SubscriptionToken(token)
    }

    /// Remove an observer. Safe to call with an already-removed token.
    pub fn unsubscribe(&mut self, token: SubscriptionToken) {
        self.subscribers.retain(|(id, _)| *id != token.0);
    }

    /// Force a recompute regardless of cause changes (e.g., on app
    /// foreground, so time-dependent escalation is re-evaluated).
    /// Publishing remains gated on structural change.
    pub fn refresh(&mut self) {
        if self.batch_depth > 0 {
            self.batch_dirty = true;
        } else {
            self.recompute_and_publish();
        }
    }

    fn recompute_and_publish(&mut self) {
        // Before the first tracking callback the default snapshot is the
        // defined result; skip the derivation and its dev assertion.
        let next = if self.causes.tracking.is_none() {
            UiSnapshot::default()
        } else {
            build_snapshot(&self.causes, &self.config, (self.clock)())
        };

        if next == self.snapshot {
            return;
        }
        tracing::debug!(?next, "publishing ui state snapshot");
        self.snapshot = next;

        let snapshot = self.snapshot.clone();
        for (_, callback) in &mut self.subscribers {
            callback(&snapshot);
        }
    }
}

// =========================================================================
// REQUEST TICKETS
// =========================================================================

/// Ticket identifying one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

/// Advisory cancellation for supersedable request flows.
///
/// Each new request gets a monotonically increasing ticket; when a result
/// arrives with a ticket that is no longer the latest, the result is
/// discarded. The underlying operation is not aborted.
#[derive(Debug, Default)]
pub struct RequestCoordinator {
    latest: u64,
}

impl RequestCoordinator {
    /// A coordinator with no requests issued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket for a new request, superseding all earlier ones.
    pub fn issue(&mut self) -> RequestTicket {
        self.latest += 1;
        RequestTicket(self.latest)
    }

    /// Whether a result carrying `ticket` should still be applied.
    #[must_use]
    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        let current = ticket.0 == self.latest;
        if !current {
            tracing::debug!(ticket = ticket.0, latest = self.latest, "discarding stale result");
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ReportState, SyncProblem, TracingDisplay};
    use crate::status::InactiveReason;
    use chrono::TimeZone;
    use std::cell::Cell;
    use std::rc::Rc;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn store_at(now: Rc<Cell<DateTime<Utc>>>) -> StateStore {
        let clock = Box::new(move || now.get());
        StateStore::with_clock(DerivationConfig::default(), clock)
    }

    fn counting_store() -> (StateStore, Rc<Cell<usize>>) {
        let mut store = StateStore::new(DerivationConfig::default());
        store.set_tracking_status(TrackingStatus::Active);
        let count = Rc::new(Cell::new(0));
        let observed = Rc::clone(&count);
        store.subscribe(move |_| observed.set(observed.get() + 1));
        // Discount the synchronous initial delivery.
        count.set(0);
        (store, count)
    }

    #[test]
    fn test_subscribe_delivers_current_snapshot_synchronously() {
        let mut store = StateStore::new(DerivationConfig::default());
        let seen = Rc::new(Cell::new(false));
        let flag = Rc::clone(&seen);
        store.subscribe(move |snapshot| {
            assert_eq!(*snapshot, UiSnapshot::default());
            flag.set(true);
        });
        assert!(seen.get());
    }

    #[test]
    fn test_batched_mutations_publish_once() {
        let (mut store, count) = counting_store();

        store.begin_batch();
        store.set_tracking_status(TrackingStatus::Inactive(InactiveReason::BluetoothOff));
        store.set_push_ok(false);
        store.set_background_refresh_available(false);
        assert_eq!(count.get(), 0);
        store.end_batch();

        assert_eq!(count.get(), 1);
        assert_eq!(store.snapshot().tracing, TracingDisplay::BluetoothOff);
        assert!(store.snapshot().push_problem);
    }

    #[test]
    fn test_batch_without_observable_change_publishes_nothing() {
        let (mut store, count) = counting_store();

        store.begin_batch();
        store.set_tracking_status(TrackingStatus::Active);
        store.set_push_ok(true);
        store.end_batch();

        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_nested_batches_coalesce_to_outermost() {
        let (mut store, count) = counting_store();

        store.begin_batch();
        store.set_push_ok(false);
        store.begin_batch();
        store.set_background_refresh_available(false);
        store.end_batch();
        assert_eq!(count.get(), 0);
        store.end_batch();

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_same_value_does_not_recompute() {
        let (mut store, count) = counting_store();
        store.set_push_ok(true);
        store.set_tracking_status(TrackingStatus::Active);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_unsubscribe_is_deterministic() {
        let (mut store, count) = counting_store();
        let token = store.subscribe(|_| {});

        store.unsubscribe(token);
        store.set_push_ok(false);
        // The remaining counting subscriber still fires.
        assert_eq!(count.get(), 1);

        // Unsubscribing twice is harmless.
        store.unsubscribe(token);
    }

    #[test]
    fn test_infected_dominates_through_store() {
        let (mut store, _count) = counting_store();

        store.begin_batch();
        store.set_tracking_status(TrackingStatus::Inactive(InactiveReason::BluetoothOff));
        store.set_infection_status(InfectionStatus::Infected);
        store.end_batch();

        assert_eq!(store.snapshot().tracing, TracingDisplay::Ended);
        assert_eq!(store.snapshot().report, ReportState::Infected);
    }

    #[test]
    fn test_refresh_surfaces_time_dependent_escalation() {
        let now = Rc::new(Cell::new(at(1, 0)));
        let mut store = store_at(Rc::clone(&now));
        store.set_tracking_status(TrackingStatus::Active);

        store.record_sync_failure(SyncError::Network);
        now.set(at(1, 6));
        store.record_sync_failure(SyncError::Network);
        assert_eq!(store.snapshot().sync_problem, None);

        // Still failing two days later; the next failure crosses the grace
        // period and refresh-alone would surface it too.
        now.set(at(3, 0));
        store.record_sync_failure(SyncError::Network);
        assert_eq!(store.snapshot().sync_problem, Some(SyncProblem::Network));
    }

    #[test]
    fn test_sync_success_clears_sticky_time_inconsistency() {
        let now = Rc::new(Cell::new(at(1, 0)));
        let mut store = store_at(Rc::clone(&now));
        store.set_tracking_status(TrackingStatus::Active);

        store.record_sync_failure(SyncError::TimeInconsistency);
        assert!(store.causes().time_inconsistency);
        assert_eq!(
            store.snapshot().sync_problem,
            Some(SyncProblem::TimeInconsistency)
        );
        assert_eq!(store.snapshot().tracing, TracingDisplay::TimeInconsistency);

        store.record_sync_success();
        assert!(!store.causes().time_inconsistency);
        assert_eq!(store.snapshot(), &UiSnapshot::default());
    }

    #[test]
    fn test_refresh_publishes_only_on_structural_change() {
        let (mut store, count) = counting_store();
        store.refresh();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_stale_request_tickets_are_discarded() {
        let mut coordinator = RequestCoordinator::new();
        let first = coordinator.issue();
        let second = coordinator.issue();

        assert!(!coordinator.is_current(first));
        assert!(coordinator.is_current(second));
    }
}
