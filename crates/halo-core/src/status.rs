//! Input types supplied by external collaborators.
//!
//! These are the "causes" the derivation engine consumes: the proximity
//! SDK's tracking status, the infection status it reports, and the history
//! of case-sync outcomes. All of them are tagged variants that the engine
//! reads and diffs but never produces itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why the proximity SDK reports tracking as inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveReason {
    /// Bluetooth is switched off at the OS level.
    BluetoothOff,
    /// The user denied the exposure-notification permission.
    PermissionDenied,
    /// The permission state has not been determined yet.
    AuthorizationUnknown,
    /// The SDK's local database failed.
    DatabaseError,
    /// The underlying exposure API returned an error.
    ExposureApiError,
    /// A networking failure stopped tracking.
    NetworkingError,
    /// The case-synchronisation step failed.
    CaseSyncError,
    /// The user is already marked infected; tracking cannot resume.
    AlreadyMarkedInfected,
    /// The operation was cancelled before completing.
    Cancelled,
    /// An infection marking could not be reset.
    InfectionNotResettable,
}

/// Current tracking state reported by the proximity SDK.
///
/// Ephemeral: each SDK callback overwrites the whole value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    /// Proximity tracking is running.
    Active,
    /// The user stopped tracking deliberately.
    Stopped,
    /// Tracking is not running for the given reason.
    Inactive(InactiveReason),
}

/// A single day on which a proximity event met the exposure threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureDay {
    /// Opaque identifier assigned by the proximity SDK.
    pub identifier: String,
    /// The date of the exposure.
    pub exposed_date: DateTime<Utc>,
}

/// Infection status reported by the proximity SDK.
///
/// Append-only from the collaborator's perspective: exposure days are never
/// mutated by this engine, only read and diffed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfectionStatus {
    /// No exposure has been detected.
    Healthy,
    /// One or more exposure days were detected.
    Exposed(Vec<ExposureDay>),
    /// The user has reported a positive test.
    Infected,
}

/// Classification of a failed case-sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncError {
    /// Bare connectivity failure. The only class whose display is delayed
    /// by the escalation grace period.
    Network,
    /// The device clock disagrees with the server.
    TimeInconsistency,
    /// The SDK's local database failed during sync.
    Database,
    /// The exposure API rejected the sync.
    ExposureApi,
    /// The published-case download or matching step failed.
    CaseSync,
    /// Any other failure.
    Unexpected,
}

impl SyncError {
    /// Whether this error class is shown immediately, bypassing the
    /// escalation grace period.
    #[must_use]
    pub const fn is_immediate(self) -> bool {
        !matches!(self, Self::Network)
    }
}

/// Rolling record of case-sync outcomes.
///
/// A failed sync extends the record; a successful sync clears it fully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorHistory {
    /// When the current error streak started.
    pub first_error_at: Option<DateTime<Utc>>,
    /// When the most recent failure occurred.
    pub last_error_at: Option<DateTime<Utc>>,
    /// The most recent failure, if the streak is still open.
    pub current_error: Option<SyncError>,
}

impl SyncErrorHistory {
    /// Record a failed sync attempt at `at`.
    pub fn record_failure(&mut self, error: SyncError, at: DateTime<Utc>) {
        if self.first_error_at.is_none() {
            self.first_error_at = Some(at);
        }
        self.last_error_at = Some(at);
        self.current_error = Some(error);
    }

    /// Record a fully successful sync, clearing the streak.
    pub fn record_success(&mut self) {
        *self = Self::default();
    }

    /// Whether any sync error is currently outstanding.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.current_error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_failure_streak_keeps_first_error_time() {
        let mut history = SyncErrorHistory::default();
        history.record_failure(SyncError::Network, at(1));
        history.record_failure(SyncError::Network, at(5));

        assert_eq!(history.first_error_at, Some(at(1)));
        assert_eq!(history.last_error_at, Some(at(5)));
        assert_eq!(history.current_error, Some(SyncError::Network));
    }

    #[test]
    fn test_success_clears_everything() {
        let mut history = SyncErrorHistory::default();
        history.record_failure(SyncError::CaseSync, at(1));
        history.record_success();

        assert_eq!(history, SyncErrorHistory::default());
        assert!(!history.has_error());
    }

    #[test]
    fn test_only_network_errors_are_delayed() {
        assert!(!SyncError::Network.is_immediate());
        assert!(SyncError::TimeInconsistency.is_immediate());
        assert!(SyncError::Database.is_immediate());
        assert!(SyncError::ExposureApi.is_immediate());
        assert!(SyncError::CaseSync.is_immediate());
        assert!(SyncError::Unexpected.is_immediate());
    }
}
