//! Similarity between time series over a sampled set of timestamps.
//!
//! Every comparison inside one checkpoint uses the same [`SampleIndex`], so
//! scores are consistent with each other even when the window is sampled.

use rand::Rng;

use crate::series::{add_minutes, minutes_between, TimeSeries, Timestamp};

/// Smoothing term that keeps the similarity finite when a series is empty
/// over the sample.
pub const SIMILARITY_EPSILON: f64 = 1e-6;

/// Default maximum number of timestamps compared per checkpoint.
pub const DEFAULT_SAMPLE_CAP: usize = 10_000;

/// Ordered set of timestamps at which series are compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIndex {
    points: Vec<Timestamp>,
    sampled: bool,
}

impl SampleIndex {
    /// Build the index for `n_points` minute offsets starting at `lo`.
    ///
    /// When `n_points <= cap` every offset is used. Otherwise `cap` distinct
    /// offsets are drawn uniformly without replacement from `rng`.
    pub fn build<R: Rng + ?Sized>(lo: Timestamp, n_points: usize, cap: usize, rng: &mut R) -> Self {
        if n_points <= cap {
            let points = (0..n_points as i64).map(|i| add_minutes(lo, i)).collect();
            return Self {
                points,
                sampled: false,
            };
        }

        let mut offsets = rand::seq::index::sample(rng, n_points, cap).into_vec();
        offsets.sort_unstable();
        let points = offsets
            .into_iter()
            .map(|i| add_minutes(lo, i as i64))
            .collect();
        Self {
            points,
            sampled: true,
        }
    }

    /// Index for the closed window `[lo, hi]` at minute granularity.
    pub fn for_window<R: Rng + ?Sized>(lo: Timestamp, hi: Timestamp, cap: usize, rng: &mut R) -> Self {
        let n_points = (minutes_between(lo, hi) + 1).max(0) as usize;
        Self::build(lo, n_points, cap, rng)
    }

    /// Index over an explicit list of timestamps.
    pub fn from_points(points: Vec<Timestamp>) -> Self {
        Self {
            points,
            sampled: false,
        }
    }

    pub fn points(&self) -> &[Timestamp] {
        &self.points
    }

    /// Whether the index was subsampled from a longer window.
    pub fn is_sampled(&self) -> bool {
        self.sampled
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

/// Cosine-like similarity of `x` and `y` restricted to `index`.
///
/// `sim = Σxy / (sqrt(Σx² · Σy²) + ε)`; missing points count as zero. Two
/// series with no overlap over the index score 0.
pub fn similarity(x: &TimeSeries, y: &TimeSeries, index: &SampleIndex) -> f64 {
    let mut sum_xx = 0.0f64;
    let mut sum_xy = 0.0f64;
    let mut sum_yy = 0.0f64;

    for ts in index.points() {
        let xi = x.get(ts) as f64;
        let yi = y.get(ts) as f64;
        sum_xx += xi * xi;
        sum_yy += yi * yi;
        sum_xy += xi * yi;
    }

    sum_xy / ((sum_xx * sum_yy).sqrt() + SIMILARITY_EPSILON)
}

/// Membership and merge decisions require a strictly greater score.
#[inline]
pub fn exceeds_threshold(score: f64, rho: f64) -> bool {
    score > rho
}

/// Dense vector of `series` values at each index timestamp.
pub fn extract_sample(series: &TimeSeries, index: &SampleIndex) -> Vec<f32> {
    index.points().iter().map(|ts| series.get(ts) as f32).collect()
}

/// Scale `v` to unit L2 norm in place. All-zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
