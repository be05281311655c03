//! Additive maintenance of cluster center series.
//!
//! A center is the elementwise sum of its members' counts. Members join and
//! leave by adding or subtracting their windowed counts; each
//! (template, window, direction) must be applied exactly once or the center
//! drifts away from its membership.

use crate::series::{TimeSeries, Timestamp};

/// Whether counts are folded into or taken out of a center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Add,
    Subtract,
}

impl Direction {
    #[inline]
    fn sign(self) -> i64 {
        match self {
            Direction::Add => 1,
            Direction::Subtract => -1,
        }
    }
}

/// Apply `series` over `[lo, hi)` to `center` in the given direction.
///
/// Returns the total magnitude moved, used for volume bookkeeping.
pub fn adjust(
    center: &mut TimeSeries,
    lo: Timestamp,
    hi: Timestamp,
    series: &TimeSeries,
    direction: Direction,
) -> i64 {
    let sign = direction.sign();
    let mut total = 0;
    for (ts, count) in series.range(lo, hi) {
        center.add(ts, sign * count);
        total += count;
    }
    total
}
