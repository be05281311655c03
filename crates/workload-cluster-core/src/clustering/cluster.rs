//! Cluster records and the arena that owns them.
//!
//! The arena hands out [`ClusterId`]s in strictly increasing order and never
//! recycles one. Retiring a cluster (merge, or its last member leaving)
//! removes it from the live set but keeps its cumulative volume so that
//! downstream consumers can still account for merged-away ids.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};
use crate::series::{TimeSeries, Timestamp};

use super::center::{adjust, Direction};
use super::membership::ClusterId;

/// A live cluster of templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster identifier (unique for the whole run).
    pub id: ClusterId,

    /// Running sum of member templates' counts.
    pub center: TimeSeries,

    /// Number of templates currently assigned. At least 1 while live.
    pub size: usize,

    /// Cumulative query volume credited to this cluster. Never decremented.
    pub total: i64,
}

impl Cluster {
    fn new(id: ClusterId, center: TimeSeries) -> Self {
        Self {
            id,
            center,
            size: 1,
            total: 0,
        }
    }
}

/// Owner of every cluster's mutable state across the run.
#[derive(Debug, Clone, Default)]
pub struct ClusterArena {
    live: BTreeMap<ClusterId, Cluster>,
    retired_totals: BTreeMap<ClusterId, i64>,
    next_id: ClusterId,
}

impl ClusterArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a singleton cluster seeded with `series` over `[lo, hi)`.
    pub fn create(&mut self, lo: Timestamp, hi: Timestamp, series: &TimeSeries) -> ClusterId {
        let id = self.next_id;
        self.next_id += 1;

        let mut center = TimeSeries::new();
        adjust(&mut center, lo, hi, series, Direction::Add);
        self.live.insert(id, Cluster::new(id, center));
        id
    }

    /// Fold an existing member's new counts over `[lo, hi)` into the center
    /// and credit them to the cluster's total.
    pub fn extend(
        &mut self,
        id: ClusterId,
        lo: Timestamp,
        hi: Timestamp,
        series: &TimeSeries,
    ) -> ClusterResult<i64> {
        let cluster = self.live_mut(id)?;
        let moved = adjust(&mut cluster.center, lo, hi, series, Direction::Add);
        cluster.total += moved;
        Ok(moved)
    }

    /// Add a new member whose counts over `[lo, hi)` enter the center.
    pub fn join(
        &mut self,
        id: ClusterId,
        lo: Timestamp,
        hi: Timestamp,
        series: &TimeSeries,
    ) -> ClusterResult<()> {
        let cluster = self.live_mut(id)?;
        adjust(&mut cluster.center, lo, hi, series, Direction::Add);
        cluster.size += 1;
        Ok(())
    }

    /// Remove a member whose counts over `[lo, hi)` leave the center.
    ///
    /// Returns `true` when this was the last member and the cluster retired.
    pub fn leave(
        &mut self,
        id: ClusterId,
        lo: Timestamp,
        hi: Timestamp,
        series: &TimeSeries,
    ) -> ClusterResult<bool> {
        let cluster = self.live_mut(id)?;
        adjust(&mut cluster.center, lo, hi, series, Direction::Subtract);
        cluster.size -= 1;
        if cluster.size == 0 {
            self.retire(id);
            return Ok(true);
        }
        Ok(false)
    }

    /// Merge `source` into `target`: the source center over `[lo, hi)` and
    /// its size move to the target, and the source retires.
    pub fn absorb(
        &mut self,
        source: ClusterId,
        target: ClusterId,
        lo: Timestamp,
        hi: Timestamp,
    ) -> ClusterResult<()> {
        if source == target {
            return Err(ClusterError::invalid_parameter(format!(
                "cluster {} cannot absorb itself",
                source
            )));
        }
        // Checked before removal so a bad target leaves the source intact.
        self.live_mut(target)?;
        let absorbed = self
            .live
            .remove(&source)
            .ok_or(ClusterError::UnknownCluster(source))?;
        self.retired_totals.insert(source, absorbed.total);

        let cluster = self.live_mut(target)?;
        adjust(&mut cluster.center, lo, hi, &absorbed.center, Direction::Add);
        cluster.size += absorbed.size;
        Ok(())
    }

    fn retire(&mut self, id: ClusterId) {
        if let Some(cluster) = self.live.remove(&id) {
            self.retired_totals.insert(id, cluster.total);
        }
    }

    fn live_mut(&mut self, id: ClusterId) -> ClusterResult<&mut Cluster> {
        self.live.get_mut(&id).ok_or(ClusterError::UnknownCluster(id))
    }

    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        self.live.get(&id)
    }

    #[inline]
    pub fn is_live(&self, id: ClusterId) -> bool {
        self.live.contains_key(&id)
    }

    /// Live cluster ids in ascending order.
    pub fn live_ids(&self) -> Vec<ClusterId> {
        self.live.keys().copied().collect()
    }

    /// Live clusters in ascending id order.
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.live.values()
    }

    /// The id the next created cluster will receive; equals the number of
    /// ids issued so far.
    #[inline]
    pub fn next_id(&self) -> ClusterId {
        self.next_id
    }

    /// Cumulative volume of every cluster ever created, live or retired.
    pub fn totals(&self) -> BTreeMap<ClusterId, i64> {
        let mut totals = self.retired_totals.clone();
        totals.extend(self.live.values().map(|c| (c.id, c.total)));
        totals
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
