//! The derived UI-state snapshot published to observers.
//!
//! A [`UiSnapshot`] is recreated wholesale on every recompute and never
//! partially mutated; observers receive it by value and may compare it
//! structurally. Exactly one authoritative tracing display exists per
//! snapshot, and an infected report always dominates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::SyncError;

/// The single authoritative tracing display value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingDisplay {
    /// Tracking is running normally.
    Active,
    /// Tracking has ended permanently (the user is marked infected).
    Ended,
    /// Bluetooth is off.
    BluetoothOff,
    /// The exposure-notification permission is missing.
    PermissionError,
    /// The permission state is not yet determined.
    AuthorizationUnknown,
    /// An unexpected SDK failure (database or exposure API).
    UnexpectedError,
    /// Tracking is switched off.
    Disabled,
    /// The device clock disagrees with the server.
    TimeInconsistency,
}

/// How the last phone call relates to the exposure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneCallState {
    /// The user has never called the hotline for the current reports.
    NotCalled,
    /// The user called after the most recent exposure report.
    CalledAfterLastExposure,
    /// Multiple reports exist and the latest one has not been called about.
    MultipleExposuresNotCalled,
}

/// Derived report state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportState {
    /// No exposure report exists.
    NoReport,
    /// At least one exposure report exists.
    Exposed {
        /// Date of the most recent exposure report.
        last_report: DateTime<Utc>,
        /// Phone-call state relative to the reports.
        phone_call: PhoneCallState,
    },
    /// The user has reported a positive test.
    Infected,
}

/// The operational sync problem currently shown, if any.
///
/// When several sync-related causes are outstanding at once, the engine
/// picks one by a fixed total order: time inconsistency first, then any
/// severe (non-network) sync error, then bare connectivity failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncProblem {
    /// The device clock disagrees with the server (sticky).
    TimeInconsistency,
    /// A severe sync failure, shown immediately.
    Severe(SyncError),
    /// Connectivity has been failing for longer than the grace period.
    Network,
}

/// The full derived UI state, published to observers on structural change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiSnapshot {
    /// The authoritative tracing display.
    pub tracing: TracingDisplay,
    /// The derived report state.
    pub report: ReportState,
    /// Push notifications are not permitted.
    pub push_problem: bool,
    /// Background refresh is unavailable.
    pub background_update_problem: bool,
    /// The sync problem currently surfaced, if any.
    pub sync_problem: Option<SyncProblem>,
    /// Whether the report detail should open automatically because the most
    /// recent report has never been associated with a completed phone call.
    pub should_auto_open_report_detail: bool,
}

impl Default for UiSnapshot {
    /// The "active, no data yet" snapshot used before upstream values have
    /// loaded and as the base of every recompute.
    fn default() -> Self {
        Self {
            tracing: TracingDisplay::Active,
            report: ReportState::NoReport,
            push_problem: false,
            background_update_problem: false,
            sync_problem: None,
            should_auto_open_report_detail: false,
        }
    }
}
