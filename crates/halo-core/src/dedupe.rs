//! Exposure-notification deduplication.
//!
//! Turns the append-only set of exposure identifiers reported by the
//! proximity collaborator into "new since last time" effects. The ledger is
//! monotonic: it never shrinks except through an explicit [`ExposureDedupe::reset`],
//! so each identifier triggers at most one notification for the lifetime of
//! the ledger.
//!
//! Mutations return effects for the caller to execute; nothing is scheduled
//! or persisted from inside this module.

use serde::{Deserialize, Serialize};

use crate::status::ExposureDay;

/// A side effect the caller must carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Schedule exactly one local notification for this exposure report.
    ScheduleNotification {
        /// Identifier of the newly seen exposure report.
        identifier: String,
    },
}

/// Persisted ledger of exposure identifiers already notified about.
///
/// Insertion-ordered; membership is a linear scan because ledger sizes are
/// bounded by the number of exposure reports a device ever sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureDedupe {
    known_identifiers: Vec<String>,
}

impl ExposureDedupe {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a ledger from its persisted identifier list.
    #[must_use]
    pub fn from_identifiers(known_identifiers: Vec<String>) -> Self {
        Self { known_identifiers }
    }

    /// The identifiers already notified about, in first-appearance order.
    #[must_use]
    pub fn identifiers(&self) -> &[String] {
        &self.known_identifiers
    }

    /// Absorb the collaborator's current exposure set.
    ///
    /// Returns one [`Effect::ScheduleNotification`] per identifier not seen
    /// before, in stable order of first appearance. Repeated calls with an
    /// unchanged or shrunken set return nothing; notifications are never
    /// retracted.
    pub fn update(&mut self, days: &[ExposureDay]) -> Vec<Effect> {
        let mut effects = Vec::new();
        for day in days {
            if self.known_identifiers.iter().any(|id| *id == day.identifier) {
                continue;
            }
            self.known_identifiers.push(day.identifier.clone());
            effects.push(Effect::ScheduleNotification {
                identifier: day.identifier.clone(),
            });
        }
        if !effects.is_empty() {
            tracing::debug!(new = effects.len(), "new exposure reports to notify");
        }
        effects
    }

    /// Clear the whole ledger.
    pub fn reset(&mut self) {
        self.known_identifiers.clear();
    }
}
