//! Half-open interval arithmetic for check-in reconciliation.
//!
//! All intervals are half-open: `[start, end)`, with `end` exclusive. Two
//! intervals that merely touch at a boundary do not overlap, and an interval
//! with `start >= end` covers nothing.
//!
//! The central operation is [`free_subranges`]: subtract a set of covered
//! ranges from a query range and return what survives. It is a pure,
//! order-independent reduction — the covered ranges need not be sorted or
//! mutually disjoint, and running it twice on identical inputs yields
//! identical output.

use serde::{Deserialize, Serialize};

/// A half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval<T> {
    /// Inclusive start of the interval.
    pub start: T,
    /// Exclusive end of the interval.
    pub end: T,
}

impl<T: Copy + Ord> Interval<T> {
    /// Create a new interval. `start >= end` is permitted and yields an
    /// empty interval.
    pub const fn new(start: T, end: T) -> Self {
        Self { start, end }
    }

    /// Whether this interval covers nothing.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Whether this interval has non-zero intersection with `other`.
    ///
    /// Touching boundaries (`self.end == other.start` or vice versa) do not
    /// count as overlap, and empty intervals overlap nothing.
    pub fn overlaps(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.start < other.end && other.start < self.end
    }

    /// Subtract `covered` from this interval, yielding up to two fragments
    /// in ascending order.
    fn subtract(&self, covered: &Self) -> Vec<Self> {
        if !self.overlaps(covered) {
            return vec![*self];
        }
        let mut fragments = Vec::with_capacity(2);
        if covered.start > self.start {
            fragments.push(Self::new(self.start, covered.start));
        }
        if covered.end < self.end {
            fragments.push(Self::new(covered.end, self.end));
        }
        fragments
    }
}

/// Subtract every interval in `existing` from `query`, returning the
/// surviving sub-ranges of `query` in their natural order.
///
/// An empty result signals that `query` is fully covered. `existing` may be
/// unsorted and its entries may overlap each other; the result does not
/// depend on their order.
pub fn free_subranges<T: Copy + Ord>(existing: &[Interval<T>], query: Interval<T>) -> Vec<Interval<T>> {
    let mut remainder = if query.is_empty() {
        Vec::new()
    } else {
        vec![query]
    };

    for covered in existing {
        if remainder.is_empty() {
            break;
        }
        remainder = remainder
            .iter()
            .flat_map(|range| range.subtract(covered))
            .collect();
    }

    remainder
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: i64, end: i64) -> Interval<i64> {
        Interval::new(start, end)
    }

    #[test]
    fn test_gap_between_covered_ranges_survives() {
        let existing = [iv(0, 10), iv(15, 20), iv(20, 30)];
        let free = free_subranges(&existing, iv(5, 25));
        assert_eq!(free, vec![iv(10, 15)]);
    }

    #[test]
    fn test_trailing_fragment_survives() {
        let existing = [iv(0, 10), iv(15, 20), iv(20, 30)];
        let free = free_subranges(&existing, iv(5, 35));
        assert_eq!(free, vec![iv(10, 15), iv(30, 35)]);
    }

    #[test]
    fn test_fully_covered_query_is_empty() {
        let existing = [iv(0, 35)];
        assert!(free_subranges(&existing, iv(5, 25)).is_empty());
    }

    #[test]
    fn test_touching_boundary_is_not_overlap() {
        let existing = [iv(0, 10)];
        let free = free_subranges(&existing, iv(10, 20));
        assert_eq!(free, vec![iv(10, 20)]);
    }

    #[test]
    fn test_result_is_order_independent() {
        let forward = [iv(0, 10), iv(15, 20), iv(20, 30)];
        let shuffled = [iv(20, 30), iv(0, 10), iv(15, 20)];
        assert_eq!(
            free_subranges(&forward, iv(5, 35)),
            free_subranges(&shuffled, iv(5, 35))
        );
    }

    #[test]
    fn test_reduction_is_idempotent() {
        let existing = [iv(3, 7), iv(6, 12), iv(0, 2)];
        let first = free_subranges(&existing, iv(0, 20));
        let second = free_subranges(&existing, iv(0, 20));
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_intervals_cover_nothing() {
        let existing = [iv(5, 5)];
        assert_eq!(free_subranges(&existing, iv(0, 10)), vec![iv(0, 10)]);

        // An empty query has no free sub-ranges either.
        assert!(free_subranges(&[iv(0, 1)], iv(5, 5)).is_empty());
    }

    #[test]
    fn test_overlapping_existing_entries() {
        let existing = [iv(0, 10), iv(5, 15)];
        assert_eq!(free_subranges(&existing, iv(0, 20)), vec![iv(15, 20)]);
    }

    #[test]
    fn test_overlap_predicate_half_open() {
        assert!(iv(0, 10).overlaps(&iv(9, 11)));
        assert!(!iv(0, 10).overlaps(&iv(10, 20)));
        assert!(!iv(0, 10).overlaps(&iv(-5, 0)));
        assert!(!iv(5, 5).overlaps(&iv(0, 10)));
    }
}
