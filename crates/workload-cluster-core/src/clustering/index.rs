//! Nearest-center index over sampled, L2-normalised cluster centers.
//!
//! Rebuilt from scratch at every checkpoint. The index only proposes
//! candidates; every decision is re-checked with the exact
//! [`similarity`](super::similarity::similarity) because L2 distance between
//! normalised samples is not the score used for membership.
//!
//! # Backends
//!
//! | Backend | Type | Use |
//! |---------|------|-----|
//! | `hnsw`  | [`HnswCenterIndex`] | Production: `hnsw_rs` graph, L2 distance |
//! | `exact` | [`ExactCenterIndex`] | Brute-force scan, fully deterministic |

use std::fmt;

use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::prelude::*;
use tracing::{debug, warn};

use crate::config::{IndexBackend, IndexConfig};
use crate::error::{ClusterError, ClusterResult};
use crate::series::TimeSeries;

use super::cluster::ClusterArena;
use super::membership::ClusterId;
use super::similarity::{extract_sample, normalize, SampleIndex};

/// What the index is being built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Nearest cluster for a template needing (re)assignment.
    Assignment,
    /// Nearest *other* cluster for merge detection. The first hit is
    /// normally the cluster itself, so two neighbours are requested.
    Merge,
}

impl IndexMode {
    #[inline]
    pub fn neighbours(self) -> usize {
        match self {
            IndexMode::Assignment => 1,
            IndexMode::Merge => 2,
        }
    }
}

/// k-nearest-neighbour capability over a fixed set of vectors.
///
/// Returned values are positions in the order the vectors were supplied,
/// nearest first.
pub trait NearestCenterIndex {
    fn nearest(&self, query: &[f32], k: usize) -> ClusterResult<Vec<usize>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Exact backend
// ============================================================================

/// Brute-force L2 scan. Ties resolve to the lower position.
#[derive(Debug, Clone)]
pub struct ExactCenterIndex {
    vectors: Vec<Vec<f32>>,
}

impl ExactCenterIndex {
    pub fn new(vectors: Vec<Vec<f32>>) -> Self {
        Self { vectors }
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl NearestCenterIndex for ExactCenterIndex {
    fn nearest(&self, query: &[f32], k: usize) -> ClusterResult<Vec<usize>> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(pos, v)| (pos, squared_l2(query, v)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(scored.into_iter().take(k).map(|(pos, _)| pos).collect())
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}

// ============================================================================
// HNSW backend
// ============================================================================

/// HNSW graph from `hnsw_rs` using L2 distance.
pub struct HnswCenterIndex {
    inner: Hnsw<'static, f32, DistL2>,
    len: usize,
    dimension: usize,
    ef_search: usize,
}

impl fmt::Debug for HnswCenterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HnswCenterIndex")
            .field("len", &self.len)
            .field("dimension", &self.dimension)
            .field("ef_search", &self.ef_search)
            .finish()
    }
}

impl HnswCenterIndex {
    /// Build the graph over `vectors`, which must share one dimension.
    pub fn new(vectors: &[Vec<f32>], config: &IndexConfig) -> ClusterResult<Self> {
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(ClusterError::index(format!(
                "dimension mismatch building HNSW: expected {}, got {}",
                dimension,
                bad.len()
            )));
        }

        let inner = Hnsw::<f32, DistL2>::new(
            config.max_connections,
            vectors.len().max(1),
            config.max_layer,
            config.ef_construction,
            DistL2 {},
        );
        for (pos, v) in vectors.iter().enumerate() {
            inner.insert_slice((v.as_slice(), pos));
        }
        debug!(
            "Built HNSW center index: n={}, dim={}, M={}, ef_construction={}",
            vectors.len(),
            dimension,
            config.max_connections,
            config.ef_construction
        );

        Ok(Self {
            inner,
            len: vectors.len(),
            dimension,
            ef_search: config.ef_search,
        })
    }
}

impl NearestCenterIndex for HnswCenterIndex {
    fn nearest(&self, query: &[f32], k: usize) -> ClusterResult<Vec<usize>> {
        if query.len() != self.dimension {
            return Err(ClusterError::index(format!(
                "dimension mismatch in HNSW search: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }
        let ef_search = self.ef_search.max(k);
        let neighbours: Vec<Neighbour> = self.inner.search(query, k, ef_search);
        Ok(neighbours
            .into_iter()
            .filter_map(|n| {
                if n.d_id < self.len {
                    Some(n.d_id)
                } else {
                    warn!("HNSW search returned unknown data_id={}, skipping", n.d_id);
                    None
                }
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.len
    }
}

// ============================================================================
// CenterIndex
// ============================================================================

/// Per-checkpoint index over the live cluster centers, in ascending id order.
pub struct CenterIndex {
    mode: IndexMode,
    ids: Vec<ClusterId>,
    inner: Box<dyn NearestCenterIndex>,
}

impl fmt::Debug for CenterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CenterIndex")
            .field("mode", &self.mode)
            .field("clusters", &self.ids.len())
            .finish()
    }
}

impl CenterIndex {
    /// Build an index over every live cluster in `arena`.
    ///
    /// Returns `Ok(None)` when fewer than two clusters are live; callers
    /// then fall back to a linear scan.
    pub fn build(
        mode: IndexMode,
        arena: &ClusterArena,
        sample: &SampleIndex,
        config: &IndexConfig,
    ) -> ClusterResult<Option<Self>> {
        if arena.len() < 2 {
            debug!("Skipping {:?} index: only {} live cluster(s)", mode, arena.len());
            return Ok(None);
        }

        let mut ids = Vec::with_capacity(arena.len());
        let mut vectors = Vec::with_capacity(arena.len());
        for cluster in arena.clusters() {
            ids.push(cluster.id);
            vectors.push(normalized_sample(&cluster.center, sample));
        }

        let inner: Box<dyn NearestCenterIndex> = match config.backend {
            IndexBackend::Hnsw => Box::new(HnswCenterIndex::new(&vectors, config)?),
            IndexBackend::Exact => Box::new(ExactCenterIndex::new(vectors)),
        };

        Ok(Some(Self { mode, ids, inner }))
    }

    /// Cluster ids in the order they were indexed.
    pub fn ids(&self) -> &[ClusterId] {
        &self.ids
    }

    pub fn mode(&self) -> IndexMode {
        self.mode
    }

    /// Nearest indexed clusters to `series`, as `(position, id)` pairs.
    pub fn query(
        &self,
        series: &TimeSeries,
        sample: &SampleIndex,
    ) -> ClusterResult<Vec<(usize, ClusterId)>> {
        let query = normalized_sample(series, sample);
        let positions = self.inner.nearest(&query, self.mode.neighbours())?;
        Ok(positions
            .into_iter()
            .map(|pos| (pos, self.ids[pos]))
            .collect())
    }

    /// Nearest indexed cluster to `series`.
    pub fn nearest(&self, series: &TimeSeries, sample: &SampleIndex) -> ClusterResult<Option<ClusterId>> {
        Ok(self.query(series, sample)?.first().map(|&(_, id)| id))
    }

    /// Position of the nearest indexed cluster other than the one at
    /// `self_position`.
    pub fn nearest_other(
        &self,
        self_position: usize,
        series: &TimeSeries,
        sample: &SampleIndex,
    ) -> ClusterResult<Option<usize>> {
        Ok(self
            .query(series, sample)?
            .into_iter()
            .map(|(pos, _)| pos)
            .find(|&pos| pos != self_position))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn normalized_sample(series: &TimeSeries, sample: &SampleIndex) -> Vec<f32> {
    let mut v = extract_sample(series, sample);
    normalize(&mut v);
    v
}
