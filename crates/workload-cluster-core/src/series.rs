//! Time-indexed series of query counts.
//!
//! A [`TimeSeries`] is a sparse, ordered mapping from minute-granularity
//! timestamps to integer counts. It backs both the raw per-template arrival
//! data and the per-cluster aggregate centers.
//!
//! Missing timestamps read as zero. Lookups are `O(log n)`; range iteration
//! is `O(log n + k)` for `k` matching points.

use std::collections::BTreeMap;
use std::ops::Bound;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Timestamp type used throughout the engine (naive, minute granularity).
pub type Timestamp = NaiveDateTime;

/// Sparse, time-ordered series of integer counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeries {
    points: BTreeMap<Timestamp, i64>,
}

impl TimeSeries {
    /// Create an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the count at `ts`, replacing any previous value.
    pub fn insert(&mut self, ts: Timestamp, count: i64) {
        self.points.insert(ts, count);
    }

    /// Add `delta` to the count at `ts`, creating the entry if absent.
    ///
    /// Entries that reach zero are dropped so that an addition followed by
    /// the matching subtraction leaves the series exactly as it was.
    pub fn add(&mut self, ts: Timestamp, delta: i64) {
        if delta == 0 {
            return;
        }
        let slot = self.points.entry(ts).or_insert(0);
        *slot += delta;
        if *slot == 0 {
            self.points.remove(&ts);
        }
    }

    /// Count at `ts`, or zero when no point is stored.
    #[inline]
    pub fn get(&self, ts: &Timestamp) -> i64 {
        self.points.get(ts).copied().unwrap_or(0)
    }

    /// Whether a point is stored at `ts`.
    #[inline]
    pub fn contains(&self, ts: &Timestamp) -> bool {
        self.points.contains_key(ts)
    }

    /// Points with timestamps in the half-open range `[lo, hi)`, in order.
    pub fn range(&self, lo: Timestamp, hi: Timestamp) -> impl Iterator<Item = (Timestamp, i64)> + '_ {
        let bounds = if lo < hi {
            (Bound::Included(lo), Bound::Excluded(hi))
        } else {
            // BTreeMap::range panics on inverted bounds; an empty window yields nothing.
            (Bound::Excluded(lo), Bound::Excluded(lo))
        };
        self.points.range(bounds).map(|(ts, count)| (*ts, *count))
    }

    /// Whether any point falls inside `[lo, hi)`.
    ///
    /// This is the "has this template arrived yet" check used by the
    /// reconciler before it considers an unassigned template.
    pub fn has_activity(&self, lo: Timestamp, hi: Timestamp) -> bool {
        self.range(lo, hi).next().is_some()
    }

    /// The latest stored point at or before `ts`.
    pub fn at_or_before(&self, ts: Timestamp) -> Option<(Timestamp, i64)> {
        self.points
            .range(..=ts)
            .next_back()
            .map(|(ts, count)| (*ts, *count))
    }

    /// Running total series: each point holds the sum of all counts up to and
    /// including its timestamp.
    pub fn cumulative(&self) -> TimeSeries {
        let mut total = 0;
        let points = self
            .points
            .iter()
            .map(|(ts, count)| {
                total += count;
                (*ts, total)
            })
            .collect();
        TimeSeries { points }
    }

    /// Sum of all stored counts.
    pub fn total(&self) -> i64 {
        self.points.values().sum()
    }

    /// Earliest stored timestamp.
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.points.keys().next().copied()
    }

    /// Latest stored timestamp.
    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.points.keys().next_back().copied()
    }

    /// Iterate over all points in timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, i64)> + '_ {
        self.points.iter().map(|(ts, count)| (*ts, *count))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl FromIterator<(Timestamp, i64)> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = (Timestamp, i64)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Whole minutes from `lo` to `hi` (negative if `hi` precedes `lo`).
#[inline]
pub fn minutes_between(lo: Timestamp, hi: Timestamp) -> i64 {
    (hi - lo).num_minutes()
}

/// `ts` shifted forward by `minutes`.
#[inline]
pub fn add_minutes(ts: Timestamp, minutes: i64) -> Timestamp {
    ts + Duration::minutes(minutes)
}
