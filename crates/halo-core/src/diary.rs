//! Venue check-in diary with overlap reconciliation.
//!
//! A [`CheckIn`] records a self-reported venue visit. Open check-ins (no
//! checkout time yet) are not part of the archived interval set; once
//! checked out, an entry is immutable except through an edit that passes
//! the conflict gate again.
//!
//! Conflicts are data, never errors: [`Diary::apply_edit`] returns the
//! overlapping entries, and the sole "safe to commit" signal is an empty
//! conflict list. [`Diary::apply_edit_resolving`] enforces the resolution
//! loop — each conflict must be removed or adjusted before the original
//! edit commits.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interval::{free_subranges, Interval};

/// A self-reported venue visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIn {
    /// Unique identifier of this entry.
    pub id: Uuid,
    /// Opaque reference to the venue (from the scanned code).
    pub venue: String,
    /// When the user checked in.
    pub check_in_at: DateTime<Utc>,
    /// When the user checked out; `None` while the visit is still open.
    pub check_out_at: Option<DateTime<Utc>>,
}

impl CheckIn {
    /// The half-open interval this entry covers, if it has been archived.
    #[must_use]
    pub fn interval(&self) -> Option<Interval<DateTime<Utc>>> {
        self.check_out_at
            .map(|end| Interval::new(self.check_in_at, end))
    }
}

/// A pending change to an archived entry's times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckInEdit {
    /// Entry being edited.
    pub id: Uuid,
    /// New check-in time.
    pub check_in_at: DateTime<Utc>,
    /// New check-out time.
    pub check_out_at: DateTime<Utc>,
}

impl CheckInEdit {
    fn interval(&self) -> Interval<DateTime<Utc>> {
        Interval::new(self.check_in_at, self.check_out_at)
    }
}

/// Result of pushing a candidate interval through the conflict gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The change was applied.
    Committed,
    /// The change was withheld; these archived entries overlap it.
    Conflicts(Vec<CheckIn>),
    /// The edited entry does not exist.
    UnknownEntry,
}

/// How the caller resolves one conflicting entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Delete the conflicting entry.
    Remove,
    /// Re-time the conflicting entry. The adjustment is an edit in its own
    /// right and passes the conflict gate itself; any entries it lands on
    /// are handed to the same resolver.
    Adjust {
        /// New check-in time for the conflicting entry.
        check_in_at: DateTime<Utc>,
        /// New check-out time for the conflicting entry.
        check_out_at: DateTime<Utc>,
    },
    /// Give up; the original edit stays uncommitted.
    Abort,
}

/// The user's check-in diary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diary {
    entries: Vec<CheckIn>,
}

impl Diary {
    /// An empty diary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[CheckIn] {
        &self.entries
    }

    /// Look up an entry by identifier.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&CheckIn> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Start an open check-in at `venue`. Open entries are outside the
    /// archived interval set, so no gate applies yet.
    pub fn start_check_in(&mut self, venue: impl Into<String>, at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.push(CheckIn {
            id,
            venue: venue.into(),
            check_in_at: at,
            check_out_at: None,
        });
        id
    }

    /// Close an open check-in, archiving it through the conflict gate.
    pub fn check_out(&mut self, id: Uuid, at: DateTime<Utc>) -> EditOutcome {
        let Some(check_in_at) = self.get(id).map(|entry| entry.check_in_at) else {
            return EditOutcome::UnknownEntry;
        };
        self.apply_edit(CheckInEdit {
            id,
            check_in_at,
            check_out_at: at,
        })
    }

    /// Every archived entry (other than `excluding`) whose interval has
    /// non-zero intersection with `candidate`. Touching ends do not count.
    #[must_use]
    pub fn overlapping(
        &self,
        candidate: Interval<DateTime<Utc>>,
        excluding: Option<Uuid>,
    ) -> Vec<CheckIn> {
        self.entries
            .iter()
            .filter(|entry| Some(entry.id) != excluding)
            .filter(|entry| {
                entry
                    .interval()
                    .is_some_and(|interval| interval.overlaps(&candidate))
            })
            .cloned()
            .collect()
    }

    /// The sub-ranges of `query` not covered by any archived entry.
    #[must_use]
    pub fn free_windows(&self, query: Interval<DateTime<Utc>>) -> Vec<Interval<DateTime<Utc>>> {
        let covered: Vec<_> = self.entries.iter().filter_map(CheckIn::interval).collect();
        free_subranges(&covered, query)
    }

    /// Push an edit through the conflict gate.
    ///
    /// Commits and returns [`EditOutcome::Committed`] only when no archived
    /// entry overlaps the new interval; otherwise returns the conflicting
    /// entries unchanged.
    pub fn apply_edit(&mut self, edit: CheckInEdit) -> EditOutcome {
        if self.get(edit.id).is_none() {
            return EditOutcome::UnknownEntry;
        }

        let conflicts = self.overlapping(edit.interval(), Some(edit.id));
        if !conflicts.is_empty() {
            return EditOutcome::Conflicts(conflicts);
        }

        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == edit.id) {
            entry.check_in_at = edit.check_in_at;
            entry.check_out_at = Some(edit.check_out_at);
        }
        EditOutcome::Committed
    }

    /// Apply an edit, looping the conflict gate until it is clear.
    ///
    /// `resolve` is called once per conflicting entry per round; the gate is
    /// re-checked after each round, so an adjustment that introduces a new
    /// overlap is caught. Adjustments are edits in their own right: each one
    /// passes the gate itself, and entries it conflicts with go to the same
    /// resolver, so a resolution can never commit an overlap elsewhere in
    /// the diary. Returns the final outcome — [`EditOutcome::Conflicts`]
    /// carries the conflicts still outstanding at the time the caller gave
    /// up.
    pub fn apply_edit_resolving<F>(&mut self, edit: CheckInEdit, mut resolve: F) -> EditOutcome
    where
        F: FnMut(&CheckIn) -> ConflictResolution,
    {
        self.resolve_through_gate(edit, &mut resolve)
    }

    fn resolve_through_gate(
        &mut self,
        edit: CheckInEdit,
        resolve: &mut dyn FnMut(&CheckIn) -> ConflictResolution,
    ) -> EditOutcome {
        loop {
            match self.apply_edit(edit) {
                EditOutcome::Conflicts(conflicts) => {
                    for conflict in &conflicts {
                        match resolve(conflict) {
                            ConflictResolution::Remove => self.remove(conflict.id),
                            ConflictResolution::Adjust {
                                check_in_at,
                                check_out_at,
                            } => {
                                let adjustment = CheckInEdit {
                                    id: conflict.id,
                                    check_in_at,
                                    check_out_at,
                                };
                                let adjusted =
                                    self.resolve_through_gate(adjustment, &mut *resolve);
                                if adjusted != EditOutcome::Committed {
                                    return self.outstanding_conflicts(edit);
                                }
                            }
                            ConflictResolution::Abort => {
                                return self.outstanding_conflicts(edit);
                            }
                        }
                    }
                }
                outcome => return outcome,
            }
        }
    }

    /// The conflicts currently blocking `edit`, recomputed so callers see
    /// the actual remaining blockers rather than a start-of-round list.
    fn outstanding_conflicts(&self, edit: CheckInEdit) -> EditOutcome {
        EditOutcome::Conflicts(self.overlapping(edit.interval(), Some(edit.id)))
    }

    /// Remove an entry.
    pub fn remove(&mut self, id: Uuid) {
        self.entries.retain(|entry| entry.id != id);
    }

    /// Entries grouped by the UTC date of their check-in time, days
    /// ascending and entries within a day ordered by check-in time.
    #[must_use]
    pub fn days(&self) -> Vec<(NaiveDate, Vec<CheckIn>)> {
        let mut sorted: Vec<CheckIn> = self.entries.clone();
        sorted.sort_by_key(|entry| entry.check_in_at);

        let mut groups: Vec<(NaiveDate, Vec<CheckIn>)> = Vec::new();
        for entry in sorted {
            let day = entry.check_in_at.date_naive();
            match groups.last_mut() {
                Some((current, group)) if *current == day => group.push(entry),
                _ => groups.push((day, vec![entry])),
            }
        }
        groups
    }
}
