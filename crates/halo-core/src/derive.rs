//! Pure derivation of the UI-state snapshot from its causes.
//!
//! [`build_snapshot`] is deterministic, synchronous and side-effect-free:
//! given the same [`Causes`], [`DerivationConfig`] and clock value it always
//! produces the same [`UiSnapshot`]. It never returns an error; missing
//! upstream data yields the default snapshot (and an assertion in debug
//! builds).
//!
//! Precedence is resolved in a fixed order:
//!
//! 1. Start from the default "active, no data yet" snapshot.
//! 2. Map the tracking status onto the tracing display.
//! 3. Overlay operational-health flags (push, background refresh, sync
//!    escalation) independently of step 2.
//! 4. Resolve the infection status; `infected` unconditionally forces the
//!    tracing display to `ended`.
//! 5. Decide whether the report detail should auto-open.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::snapshot::{PhoneCallState, ReportState, SyncProblem, TracingDisplay, UiSnapshot};
use crate::status::{InactiveReason, InfectionStatus, SyncErrorHistory, TrackingStatus};

/// Runtime configuration consumed by [`build_snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationConfig {
    /// How long a bare connectivity failure must persist before it is
    /// surfaced as a sync problem.
    pub sync_error_grace_period: Duration,
    /// Whether the injected infection override is honoured. Off in release
    /// configurations; debug harnesses enable it at runtime.
    pub allow_infection_override: bool,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            sync_error_grace_period: Duration::days(1),
            allow_infection_override: false,
        }
    }
}

/// The complete set of independently-settable inputs to the derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Causes {
    /// Current tracking status; `None` until the SDK's first callback.
    pub tracking: Option<TrackingStatus>,
    /// Infection status reported by the proximity collaborator.
    pub infection: Option<InfectionStatus>,
    /// Debug-only replacement for the real infection status. Applied only
    /// when [`DerivationConfig::allow_infection_override`] is set.
    pub infection_override: Option<InfectionStatus>,
    /// Rolling case-sync outcome record.
    pub sync_history: SyncErrorHistory,
    /// Sticky time-inconsistency flag, cleared only by a fully successful
    /// sync.
    pub time_inconsistency: bool,
    /// The user's tracing toggle.
    pub tracing_enabled: bool,
    /// Push permission is granted.
    pub push_ok: bool,
    /// Background refresh is available.
    pub background_refresh_available: bool,
    /// When the user last completed a hotline call.
    pub last_phone_call_at: Option<DateTime<Utc>>,
    /// Report identifiers a completed call has been associated with.
    pub called_report_ids: BTreeSet<String>,
}

impl Causes {
    /// Causes for an engine that has not received any collaborator data
    /// yet. The user-facing toggles default to their permissive values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracking: None,
            infection: None,
            infection_override: None,
            sync_history: SyncErrorHistory::default(),
            time_inconsistency: false,
            tracing_enabled: true,
            push_ok: true,
            background_refresh_available: true,
            last_phone_call_at: None,
            called_report_ids: BTreeSet::new(),
        }
    }
}

/// Derive the UI-state snapshot from its causes.
///
/// Total: never panics in release builds and never returns an error. If the
/// tracking status has not been delivered yet the default snapshot is
/// returned, with a debug-build assertion flagging the omission.
#[must_use]
pub fn build_snapshot(causes: &Causes, config: &DerivationConfig, now: DateTime<Utc>) -> UiSnapshot {
    let mut snapshot = UiSnapshot::default();

    debug_assert!(causes.tracking.is_some(), "tracking status not loaded");
    let Some(tracking) = causes.tracking else {
        tracing::debug!("tracking status not loaded yet, deriving default snapshot");
        return snapshot;
    };

    snapshot.tracing = resolve_tracing_display(tracking, causes);

    snapshot.push_problem = !causes.push_ok;
    snapshot.background_update_problem = !causes.background_refresh_available;
    snapshot.sync_problem = resolve_sync_problem(causes, config, now);

    resolve_infection(&mut snapshot, causes, config);

    snapshot
}

/// Step 2: map the tracking status onto the tracing display.
fn resolve_tracing_display(tracking: TrackingStatus, causes: &Causes) -> TracingDisplay {
    match tracking {
        TrackingStatus::Stopped => TracingDisplay::Disabled,
        TrackingStatus::Inactive(reason) => match reason {
            InactiveReason::BluetoothOff => TracingDisplay::BluetoothOff,
            InactiveReason::PermissionDenied => TracingDisplay::PermissionError,
            InactiveReason::AuthorizationUnknown => TracingDisplay::AuthorizationUnknown,
            InactiveReason::DatabaseError | InactiveReason::ExposureApiError => {
                TracingDisplay::UnexpectedError
            }
            // These reasons are surfaced through other causes (sync history,
            // infection status); the tracing display is left unchanged.
            InactiveReason::NetworkingError
            | InactiveReason::CaseSyncError
            | InactiveReason::AlreadyMarkedInfected
            | InactiveReason::Cancelled
            | InactiveReason::InfectionNotResettable => TracingDisplay::Active,
        },
        TrackingStatus::Active => {
            if causes.sync_history.has_error() || !causes.tracing_enabled {
                if causes.time_inconsistency {
                    TracingDisplay::TimeInconsistency
                } else {
                    TracingDisplay::Disabled
                }
            } else {
                TracingDisplay::Active
            }
        }
    }
}

/// Step 3: pick the sync problem to surface, if any.
///
/// Concurrent sync-related causes are ordered: the sticky time
/// inconsistency wins, then any severe (non-network) error, then a bare
/// connectivity failure that has outlived the grace period.
fn resolve_sync_problem(
    causes: &Causes,
    config: &DerivationConfig,
    now: DateTime<Utc>,
) -> Option<SyncProblem> {
    if causes.time_inconsistency {
        return Some(SyncProblem::TimeInconsistency);
    }

    let error = causes.sync_history.current_error?;
    if error.is_immediate() {
        return Some(SyncProblem::Severe(error));
    }

    let first = causes.sync_history.first_error_at?;
    let last = causes.sync_history.last_error_at.unwrap_or(now);
    if last - first > config.sync_error_grace_period {
        Some(SyncProblem::Network)
    } else {
        None
    }
}

/// Steps 4 and 5: resolve the infection status and the auto-open decision.
fn resolve_infection(snapshot: &mut UiSnapshot, causes: &Causes, config: &DerivationConfig) {
    let infection = if config.allow_infection_override {
        causes.infection_override.as_ref().or(causes.infection.as_ref())
    } else {
        causes.infection.as_ref()
    };

    match infection {
        None | Some(InfectionStatus::Healthy) => {}
        Some(InfectionStatus::Infected) => {
            snapshot.report = ReportState::Infected;
            // Dominates whatever steps 2 and 3 produced.
            snapshot.tracing = TracingDisplay::Ended;
        }
        Some(InfectionStatus::Exposed(days)) if days.is_empty() => {}
        Some(InfectionStatus::Exposed(days)) => {
            let mut days = days.clone();
            days.sort_by_key(|day| day.exposed_date);
            // Non-empty after the guard above.
            let Some(latest) = days.last() else { return };
            let last_report = latest.exposed_date;

            let phone_call = match causes.last_phone_call_at {
                None => PhoneCallState::NotCalled,
                Some(called_at) if called_at > last_report => {
                    PhoneCallState::CalledAfterLastExposure
                }
                Some(_) if days.len() > 1 => PhoneCallState::MultipleExposuresNotCalled,
                Some(_) => PhoneCallState::NotCalled,
            };

            snapshot.report = ReportState::Exposed {
                last_report,
                phone_call,
            };
            snapshot.should_auto_open_report_detail =
                !causes.called_report_ids.contains(&latest.identifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{ExposureDay, SyncError};
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn base_causes() -> Causes {
        let mut causes = Causes::new();
        causes.tracking = Some(TrackingStatus::Active);
        causes
    }

    fn build(causes: &Causes) -> UiSnapshot {
        build_snapshot(causes, &DerivationConfig::default(), at(10, 12))
    }

    fn exposed(days: &[(&str, DateTime<Utc>)]) -> InfectionStatus {
        InfectionStatus::Exposed(
            days.iter()
                .map(|(id, date)| ExposureDay {
                    identifier: (*id).to_string(),
                    exposed_date: *date,
                })
                .collect(),
        )
    }

    #[test]
    fn test_all_clear_yields_active_default() {
        let snapshot = build(&base_causes());
        assert_eq!(snapshot, UiSnapshot::default());
    }

    #[test]
    fn test_inactive_reason_mapping() {
        let cases = [
            (InactiveReason::BluetoothOff, TracingDisplay::BluetoothOff),
            (InactiveReason::PermissionDenied, TracingDisplay::PermissionError),
            (
                InactiveReason::AuthorizationUnknown,
                TracingDisplay::AuthorizationUnknown,
            ),
            (InactiveReason::DatabaseError, TracingDisplay::UnexpectedError),
            (InactiveReason::ExposureApiError, TracingDisplay::UnexpectedError),
            (InactiveReason::NetworkingError, TracingDisplay::Active),
            (InactiveReason::CaseSyncError, TracingDisplay::Active),
            (InactiveReason::Cancelled, TracingDisplay::Active),
        ];
        for (reason, expected) in cases {
            let mut causes = base_causes();
            causes.tracking = Some(TrackingStatus::Inactive(reason));
            assert_eq!(build(&causes).tracing, expected, "reason {reason:?}");
        }
    }

    #[test]
    fn test_stopped_shows_disabled() {
        let mut causes = base_causes();
        causes.tracking = Some(TrackingStatus::Stopped);
        assert_eq!(build(&causes).tracing, TracingDisplay::Disabled);
    }

    #[test]
    fn test_user_toggle_off_shows_disabled() {
        let mut causes = base_causes();
        causes.tracing_enabled = false;
        assert_eq!(build(&causes).tracing, TracingDisplay::Disabled);
    }

    #[test]
    fn test_active_with_error_and_sticky_flag_shows_time_inconsistency() {
        let mut causes = base_causes();
        causes.sync_history.record_failure(SyncError::Network, at(10, 1));
        causes.time_inconsistency = true;
        assert_eq!(build(&causes).tracing, TracingDisplay::TimeInconsistency);
    }

    #[test]
    fn test_infected_dominates_bluetooth_off() {
        let mut causes = base_causes();
        causes.tracking = Some(TrackingStatus::Inactive(InactiveReason::BluetoothOff));
        causes.infection = Some(InfectionStatus::Infected);

        let snapshot = build(&causes);
        assert_eq!(snapshot.tracing, TracingDisplay::Ended);
        assert_eq!(snapshot.report, ReportState::Infected);
    }

    #[test]
    fn test_push_and_background_flags_overlay_independently() {
        let mut causes = base_causes();
        causes.push_ok = false;
        causes.background_refresh_available = false;
        causes.tracking = Some(TrackingStatus::Inactive(InactiveReason::BluetoothOff));

        let snapshot = build(&causes);
        assert!(snapshot.push_problem);
        assert!(snapshot.background_update_problem);
        assert_eq!(snapshot.tracing, TracingDisplay::BluetoothOff);
    }

    #[test]
    fn test_severe_sync_error_shows_immediately() {
        let mut causes = base_causes();
        causes.sync_history.record_failure(SyncError::CaseSync, at(10, 11));

        let snapshot = build(&causes);
        assert_eq!(
            snapshot.sync_problem,
            Some(SyncProblem::Severe(SyncError::CaseSync))
        );
    }

    #[test]
    fn test_network_error_is_delayed_by_grace_period() {
        let mut causes = base_causes();
        causes.sync_history.record_failure(SyncError::Network, at(10, 0));
        causes.sync_history.record_failure(SyncError::Network, at(10, 6));
        assert_eq!(build(&causes).sync_problem, None);

        // A streak longer than the 1-day default grace period surfaces.
        causes.sync_history.record_failure(SyncError::Network, at(11, 6));
        assert_eq!(build(&causes).sync_problem, Some(SyncProblem::Network));
    }

    #[test]
    fn test_sync_problem_total_order() {
        let mut causes = base_causes();
        causes.sync_history.record_failure(SyncError::Network, at(8, 0));
        causes.sync_history.record_failure(SyncError::CaseSync, at(10, 0));
        causes.time_inconsistency = true;

        // Time inconsistency wins over the severe error and the network streak.
        assert_eq!(
            build(&causes).sync_problem,
            Some(SyncProblem::TimeInconsistency)
        );

        causes.time_inconsistency = false;
        assert_eq!(
            build(&causes).sync_problem,
            Some(SyncProblem::Severe(SyncError::CaseSync))
        );
    }

    #[test]
    fn test_phone_call_between_two_reports() {
        let mut causes = base_causes();
        causes.infection = Some(exposed(&[("r1", at(1, 0)), ("r2", at(5, 0))]));
        causes.last_phone_call_at = Some(at(3, 0));

        let snapshot = build(&causes);
        assert_eq!(
            snapshot.report,
            ReportState::Exposed {
                last_report: at(5, 0),
                phone_call: PhoneCallState::MultipleExposuresNotCalled,
            }
        );
    }

    #[test]
    fn test_phone_call_after_last_report() {
        let mut causes = base_causes();
        causes.infection = Some(exposed(&[("r1", at(1, 0)), ("r2", at(5, 0))]));
        causes.last_phone_call_at = Some(at(6, 0));

        let snapshot = build(&causes);
        assert_eq!(
            snapshot.report,
            ReportState::Exposed {
                last_report: at(5, 0),
                phone_call: PhoneCallState::CalledAfterLastExposure,
            }
        );
    }

    #[test]
    fn test_never_called_single_report() {
        let mut causes = base_causes();
        causes.infection = Some(exposed(&[("r1", at(1, 0))]));

        let snapshot = build(&causes);
        assert_eq!(
            snapshot.report,
            ReportState::Exposed {
                last_report: at(1, 0),
                phone_call: PhoneCallState::NotCalled,
            }
        );
    }

    #[test]
    fn test_report_days_sorted_out_of_order_input() {
        let mut causes = base_causes();
        causes.infection = Some(exposed(&[("r2", at(5, 0)), ("r1", at(1, 0))]));

        let snapshot = build(&causes);
        assert!(matches!(
            snapshot.report,
            ReportState::Exposed { last_report, .. } if last_report == at(5, 0)
        ));
    }

    #[test]
    fn test_auto_open_tracks_latest_report_identifier() {
        let mut causes = base_causes();
        causes.infection = Some(exposed(&[("r1", at(1, 0)), ("r2", at(5, 0))]));
        assert!(build(&causes).should_auto_open_report_detail);

        causes.called_report_ids.insert("r2".to_string());
        assert!(!build(&causes).should_auto_open_report_detail);

        // A call associated only with an older report is not enough.
        causes.called_report_ids.clear();
        causes.called_report_ids.insert("r1".to_string());
        assert!(build(&causes).should_auto_open_report_detail);
    }

    #[test]
    fn test_override_ignored_unless_allowed() {
        let mut causes = base_causes();
        causes.infection = Some(InfectionStatus::Healthy);
        causes.infection_override = Some(InfectionStatus::Infected);

        assert_eq!(build(&causes).report, ReportState::NoReport);

        let config = DerivationConfig {
            allow_infection_override: true,
            ..DerivationConfig::default()
        };
        let snapshot = build_snapshot(&causes, &config, at(10, 12));
        assert_eq!(snapshot.report, ReportState::Infected);
        assert_eq!(snapshot.tracing, TracingDisplay::Ended);
    }

    #[test]
    fn test_empty_exposure_list_is_no_report() {
        let mut causes = base_causes();
        causes.infection = Some(InfectionStatus::Exposed(Vec::new()));

        let snapshot = build(&causes);
        assert_eq!(snapshot.report, ReportState::NoReport);
        assert!(!snapshot.should_auto_open_report_detail);
    }

    #[test]
    #[should_panic(expected = "tracking status not loaded")]
    fn test_missing_tracking_asserts_in_debug_builds() {
        let _ = build(&Causes::new());
    }
}
