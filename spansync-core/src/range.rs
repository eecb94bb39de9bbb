//! Time ranges and the covering-interval arithmetic the cache relies on.
//!
//! A [`TimeRange`] is a closed interval `[from, to]` of UTC timestamps.
//! Per card, the cache keeps at most one such interval - the covering
//! range - and only ever replaces it with a superset via [`TimeRange::union`].

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// The smallest representable step between two timestamps.
///
/// Used to carve fetch windows that abut the covering range without
/// re-fetching the boundary instant itself.
pub fn epsilon() -> Duration {
    Duration::nanoseconds(1)
}

/// A closed time interval `[from, to]` with `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Timestamp,
    pub to: Timestamp,
}

impl TimeRange {
    /// Create a range, swapping the bounds when given in reverse order.
    ///
    /// Reversed pairs are normalized, never rejected.
    pub fn new(from: Timestamp, to: Timestamp) -> Self {
        if from > to {
            Self { from: to, to: from }
        } else {
            Self { from, to }
        }
    }

    /// True when `ts` lies inside the closed interval.
    pub fn contains(&self, ts: Timestamp) -> bool {
        self.from <= ts && ts <= self.to
    }

    /// True when `other` lies entirely inside this range.
    pub fn contains_range(&self, other: &TimeRange) -> bool {
        self.from <= other.from && other.to <= self.to
    }

    /// True when the two closed intervals share at least one instant.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.from <= other.to && other.from <= self.to
    }

    /// True when the two intervals share no instant.
    pub fn is_disjoint_from(&self, other: &TimeRange) -> bool {
        !self.overlaps(other)
    }

    /// Smallest interval containing both ranges.
    ///
    /// This is what the cache writes back as the new covering range;
    /// the result is always a superset of `self`.
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            from: self.from.min(other.from),
            to: self.to.max(other.to),
        }
    }

    /// The last instant strictly before `self.from`.
    pub fn just_before(&self) -> Timestamp {
        self.from - epsilon()
    }

    /// The first instant strictly after `self.to`.
    pub fn just_after(&self) -> Timestamp {
        self.to + epsilon()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn day(d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2023, 3, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_new_swaps_reversed_bounds() {
        let r = TimeRange::new(day(10), day(1));
        assert_eq!(r.from, day(1));
        assert_eq!(r.to, day(10));
        assert_eq!(r, TimeRange::new(day(1), day(10)));
    }

    #[test]
    fn test_contains_is_inclusive() {
        let r = TimeRange::new(day(4), day(7));
        assert!(r.contains(day(4)));
        assert!(r.contains(day(7)));
        assert!(!r.contains(day(3)));
        assert!(!r.contains(day(8)));
    }

    #[test]
    fn test_overlap_and_disjoint() {
        let covered = TimeRange::new(day(4), day(7));
        assert!(covered.overlaps(&TimeRange::new(day(7), day(9))));
        assert!(covered.overlaps(&TimeRange::new(day(1), day(4))));
        assert!(covered.is_disjoint_from(&TimeRange::new(day(1), day(3))));
        assert!(covered.is_disjoint_from(&TimeRange::new(day(8), day(10))));
    }

    #[test]
    fn test_union_spans_gap() {
        let a = TimeRange::new(day(1), day(3));
        let b = TimeRange::new(day(5), day(7));
        let u = a.union(&b);
        assert_eq!(u, TimeRange::new(day(1), day(7)));
    }

    #[test]
    fn test_boundary_instants_do_not_overlap_range() {
        let r = TimeRange::new(day(4), day(7));
        assert!(!r.contains(r.just_before()));
        assert!(!r.contains(r.just_after()));
        assert!(r.contains(r.just_before() + epsilon()));
    }

    proptest! {
        /// Union is always a superset of both inputs - the covering
        /// range can only grow.
        #[test]
        fn prop_union_is_superset(a in 0i64..500_000, b in 0i64..500_000,
                                  c in 0i64..500_000, d in 0i64..500_000) {
            let base = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
            let r1 = TimeRange::new(base + Duration::seconds(a), base + Duration::seconds(b));
            let r2 = TimeRange::new(base + Duration::seconds(c), base + Duration::seconds(d));
            let u = r1.union(&r2);
            prop_assert!(u.contains_range(&r1));
            prop_assert!(u.contains_range(&r2));
        }

        /// Construction normalizes order: `new(a, b) == new(b, a)`.
        #[test]
        fn prop_new_is_order_insensitive(a in 0i64..500_000, b in 0i64..500_000) {
            let base = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
            let x = base + Duration::seconds(a);
            let y = base + Duration::seconds(b);
            prop_assert_eq!(TimeRange::new(x, y), TimeRange::new(y, x));
        }
    }
}
