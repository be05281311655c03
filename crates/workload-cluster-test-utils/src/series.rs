//! Arrival-rate series generators.
//!
//! Every generator starts at [`base_timestamp`] and works at minute
//! granularity. Randomized generators take an explicit seed and use
//! `ChaCha8Rng`, so fixtures are identical across runs and platforms.

use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use workload_cluster_core::series::{add_minutes, TimeSeries, Timestamp};

/// Seed used when a test has no reason to pick its own.
pub const DEFAULT_SEED: u64 = 0x5eed;

/// 2017-01-01 00:00:00, the origin of every generated series.
pub fn base_timestamp() -> Timestamp {
    NaiveDate::from_ymd_opt(2017, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("2017-01-01 is a valid date")
}

/// [`base_timestamp`] shifted by `offset` minutes.
pub fn minute(offset: i64) -> Timestamp {
    add_minutes(base_timestamp(), offset)
}

/// `count` queries every minute for `minutes` minutes.
pub fn constant_series(minutes: i64, count: i64) -> TimeSeries {
    (0..minutes).map(|m| (minute(m), count)).collect()
}

/// Square wave: `peak` queries during the first half of each `period`,
/// silence during the second half.
pub fn periodic_series(minutes: i64, period: i64, peak: i64) -> TimeSeries {
    phased_series(minutes, period, 0, peak)
}

/// [`periodic_series`] shifted right by `phase` minutes.
pub fn phased_series(minutes: i64, period: i64, phase: i64, peak: i64) -> TimeSeries {
    let on = (period / 2).max(1);
    (0..minutes)
        .filter(|m| (m - phase).rem_euclid(period) < on)
        .map(|m| (minute(m), peak))
        .collect()
}

/// [`periodic_series`] with uniform noise in `0..=noise` added to every
/// active minute.
pub fn noisy_series(minutes: i64, period: i64, peak: i64, noise: i64, seed: u64) -> TimeSeries {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    periodic_series(minutes, period, peak)
        .iter()
        .map(|(ts, count)| (ts, count + rng.gen_range(0..=noise)))
        .collect()
}
