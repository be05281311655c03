//! Per-checkpoint state transition of the online clustering engine.
//!
//! For a checkpoint window `[current, next)` with lookback floor `floor`:
//!
//! 1. Every assigned template's counts in `[current, next)` extend its
//!    cluster's center and total.
//! 2. An assignment-mode index is built over the live centers.
//! 3. Templates are visited in lexicographic order. A member stays if its
//!    cluster is a singleton or it still exceeds `rho` against the center;
//!    otherwise it leaves (its `[floor, next)` counts are subtracted). A
//!    template that is now unassigned and has activity in `[current, next)`
//!    joins the nearest cluster that exceeds `rho`, or founds a new one;
//!    without activity it stays unassigned.
//! 4. A merge-mode index is built over the surviving centers and each
//!    cluster, in ascending id order, is merged into its nearest other
//!    cluster (resolved through this pass's union-find) when their centers
//!    exceed `rho`.

use tracing::debug;

use crate::config::IndexConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::series::{TimeSeries, Timestamp};
use crate::workload::{Template, Workload};

use super::cluster::ClusterArena;
use super::index::{CenterIndex, IndexMode};
use super::membership::{Assignment, ClusterId, Membership};
use super::similarity::{exceeds_threshold, similarity, SampleIndex};
use super::union_find::UnionFind;

/// Time bounds of one checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointWindow {
    /// Start of the lookback window used for similarity and center edits.
    pub floor: Timestamp,
    /// Start of the newly observed period.
    pub current: Timestamp,
    /// End (exclusive) of the newly observed period; the checkpoint's stamp.
    pub next: Timestamp,
}

/// Counts of the transitions made during one checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckpointStats {
    pub retained: usize,
    pub quit: usize,
    pub joined: usize,
    pub reassigned: usize,
    pub created: usize,
    pub recreated: usize,
    pub merged: usize,
    /// Query volume credited to existing clusters in step 1.
    pub extended_volume: i64,
}

/// Result of reconciling one checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub assignment: Assignment,
    pub stats: CheckpointStats,
}

/// Applies one checkpoint's worth of data to the cluster state.
#[derive(Debug)]
pub struct CheckpointReconciler<'a> {
    workload: &'a Workload,
    rho: f64,
    index_config: &'a IndexConfig,
}

impl<'a> CheckpointReconciler<'a> {
    pub fn new(workload: &'a Workload, rho: f64, index_config: &'a IndexConfig) -> Self {
        Self {
            workload,
            rho,
            index_config,
        }
    }

    /// Reconcile `previous` against the data in `window`, mutating `arena`.
    ///
    /// Templates missing from `previous` start out unassigned.
    pub fn reconcile(
        &self,
        window: CheckpointWindow,
        sample: &SampleIndex,
        arena: &mut ClusterArena,
        previous: &Assignment,
    ) -> ClusterResult<ReconcileOutcome> {
        let mut assignment: Assignment = self
            .workload
            .names()
            .map(|name| {
                let membership = previous.get(name).copied().unwrap_or_default();
                (name.to_string(), membership)
            })
            .collect();
        let mut stats = CheckpointStats::default();

        self.extend_centers(window, arena, &assignment, &mut stats)?;

        let index = CenterIndex::build(IndexMode::Assignment, arena, sample, self.index_config)?;
        for (ordinal, template) in self.workload.templates().enumerate() {
            let membership = assignment
                .get(&template.text)
                .copied()
                .unwrap_or_default();
            let updated = self.reconcile_template(
                ordinal + 1,
                template,
                membership,
                window,
                sample,
                index.as_ref(),
                arena,
                &mut stats,
            )?;
            assignment.insert(template.text.clone(), updated);
        }

        self.merge_clusters(window, sample, arena, &mut assignment, &mut stats)?;

        Ok(ReconcileOutcome { assignment, stats })
    }

    fn extend_centers(
        &self,
        window: CheckpointWindow,
        arena: &mut ClusterArena,
        assignment: &Assignment,
        stats: &mut CheckpointStats,
    ) -> ClusterResult<()> {
        for template in self.workload.templates() {
            if let Some(cluster) = assignment.get(&template.text).and_then(|m| m.cluster()) {
                stats.extended_volume +=
                    arena.extend(cluster, window.current, window.next, &template.series)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn reconcile_template(
        &self,
        ordinal: usize,
        template: &Template,
        membership: Membership,
        window: CheckpointWindow,
        sample: &SampleIndex,
        index: Option<&CenterIndex>,
        arena: &mut ClusterArena,
        stats: &mut CheckpointStats,
    ) -> ClusterResult<Membership> {
        let series = &template.series;

        let mut departed_from = None;
        if let Some(cluster_id) = membership.cluster() {
            let cluster = arena
                .get(cluster_id)
                .ok_or(ClusterError::UnknownCluster(cluster_id))?;
            if cluster.size == 1
                || exceeds_threshold(similarity(series, &cluster.center, sample), self.rho)
            {
                stats.retained += 1;
                return Ok(membership);
            }

            arena.leave(cluster_id, window.floor, window.next, series)?;
            stats.quit += 1;
            departed_from = Some(cluster_id);
            debug!(
                "{}: template {} quit from cluster {} (first seen {})",
                window.next, ordinal, cluster_id, template.first_seen
            );
        }

        if !series.has_activity(window.current, window.next) {
            return Ok(Membership::Unassigned);
        }

        if let Some(target) = self.find_matching_cluster(series, sample, index, arena)? {
            arena.join(target, window.floor, window.next, series)?;
            if departed_from.is_some() {
                stats.reassigned += 1;
                debug!(
                    "{}: template {} reassigned to cluster {} (first seen {})",
                    window.next, ordinal, target, template.first_seen
                );
            } else {
                stats.joined += 1;
                debug!(
                    "{}: template {} joined cluster {} (first seen {})",
                    window.next, ordinal, target, template.first_seen
                );
            }
            return Ok(Membership::Assigned(target));
        }

        let created = arena.create(window.floor, window.next, series);
        if departed_from.is_some() {
            stats.recreated += 1;
            debug!(
                "{}: template {} recreated cluster as {} (first seen {})",
                window.next, ordinal, created, template.first_seen
            );
        } else {
            stats.created += 1;
            debug!(
                "{}: template {} created cluster as {} (first seen {})",
                window.next, ordinal, created, template.first_seen
            );
        }
        Ok(Membership::Assigned(created))
    }

    /// Candidate cluster whose center exceeds `rho` against `series`.
    ///
    /// With an index, only its nearest proposal is verified. Without one,
    /// live clusters are scanned in id order and the first match wins.
    fn find_matching_cluster(
        &self,
        series: &TimeSeries,
        sample: &SampleIndex,
        index: Option<&CenterIndex>,
        arena: &ClusterArena,
    ) -> ClusterResult<Option<ClusterId>> {
        match index {
            Some(index) => {
                let candidate = index
                    .nearest(series, sample)?
                    .and_then(|id| arena.get(id))
                    .filter(|c| exceeds_threshold(similarity(series, &c.center, sample), self.rho))
                    .map(|c| c.id);
                Ok(candidate)
            }
            None => Ok(arena
                .clusters()
                .find(|c| exceeds_threshold(similarity(series, &c.center, sample), self.rho))
                .map(|c| c.id)),
        }
    }

    fn merge_clusters(
        &self,
        window: CheckpointWindow,
        sample: &SampleIndex,
        arena: &mut ClusterArena,
        assignment: &mut Assignment,
        stats: &mut CheckpointStats,
    ) -> ClusterResult<()> {
        let Some(index) = CenterIndex::build(IndexMode::Merge, arena, sample, self.index_config)?
        else {
            return Ok(());
        };
        let ids = index.ids().to_vec();
        let mut roots = UnionFind::new(ids.len());

        for (position, &source) in ids.iter().enumerate() {
            let source_center = match arena.get(source) {
                Some(cluster) => &cluster.center,
                None => continue,
            };
            let Some(candidate) = index.nearest_other(position, source_center, sample)? else {
                continue;
            };
            let root = roots.find(candidate);
            let target = ids[root];
            if target == source {
                continue;
            }
            let target_center = &arena
                .get(target)
                .ok_or(ClusterError::UnknownCluster(target))?
                .center;
            if !exceeds_threshold(similarity(source_center, target_center, sample), self.rho) {
                continue;
            }

            arena.absorb(source, target, window.floor, window.next)?;
            roots.link(position, root);
            stats.merged += 1;

            for (text, membership) in assignment.iter_mut() {
                if *membership == Membership::Assigned(source) {
                    *membership = Membership::Assigned(target);
                    debug!("{} assigned to {} ({})", source, target, text);
                }
            }
            debug!("{}: cluster {} merged into cluster {}", window.next, source, target);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::center::{adjust, Direction};
    use crate::config::IndexBackend;
    use crate::series::add_minutes;
    use chrono::NaiveDate;

    fn ts(minute: i64) -> Timestamp {
        let base = NaiveDate::from_ymd_opt(2017, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid base date");
        add_minutes(base, minute)
    }

    fn series(points: &[(i64, i64)]) -> TimeSeries {
        points.iter().map(|&(m, c)| (ts(m), c)).collect()
    }

    fn exact() -> IndexConfig {
        IndexConfig {
            backend: IndexBackend::Exact,
            ..IndexConfig::default()
        }
    }

    fn window(floor: i64, current: i64, next: i64) -> CheckpointWindow {
        CheckpointWindow {
            floor: ts(floor),
            current: ts(current),
            next: ts(next),
        }
    }

    fn sample(n: i64) -> SampleIndex {
        SampleIndex::from_points((0..n).map(ts).collect())
    }

    #[test]
    fn test_inactive_template_stays_unassigned() {
        let workload = Workload::from_series([("late", series(&[(50, 3)]))]);
        let config = exact();
        let reconciler = CheckpointReconciler::new(&workload, 0.8, &config);
        let mut arena = ClusterArena::new();

        let outcome = reconciler
            .reconcile(window(0, 0, 10), &sample(10), &mut arena, &Assignment::new())
            .expect("reconcile");

        assert_eq!(outcome.assignment.get("late"), Some(&Membership::Unassigned));
        assert!(arena.is_empty());
        println!("[PASS] test_inactive_template_stays_unassigned - no arrival, no cluster");
    }

    #[test]
    fn test_first_arrival_creates_then_similar_joins() {
        let workload = Workload::from_series([
            ("a", series(&[(0, 5), (1, 5), (2, 5)])),
            ("b", series(&[(0, 2), (1, 2), (2, 2)])),
            ("c", series(&[(5, 7), (6, 7)])),
        ]);
        let config = exact();
        let reconciler = CheckpointReconciler::new(&workload, 0.8, &config);
        let mut arena = ClusterArena::new();

        let outcome = reconciler
            .reconcile(window(0, 0, 10), &sample(10), &mut arena, &Assignment::new())
            .expect("reconcile");

        assert_eq!(outcome.assignment["a"], Membership::Assigned(0));
        assert_eq!(outcome.assignment["b"], Membership::Assigned(0));
        assert_eq!(outcome.assignment["c"], Membership::Assigned(1));
        assert_eq!(outcome.stats.created, 2);
        assert_eq!(outcome.stats.joined, 1);
        assert_eq!(arena.get(0).expect("live").size, 2);
        assert_eq!(arena.get(0).expect("live").center.get(&ts(0)), 7);
    }

    #[test]
    fn test_similarity_exactly_rho_is_not_retained() {
        // Two members whose shapes differ; rho is set to the exact score of
        // "a" against the shared center so the strict comparison must fail.
        let a = series(&[(0, 4), (1, 1)]);
        let b = series(&[(0, 1), (1, 4)]);
        let workload = Workload::from_series([("a", a.clone()), ("b", b.clone())]);

        let mut arena = ClusterArena::new();
        let id = arena.create(ts(0), ts(10), &a);
        arena.join(id, ts(0), ts(10), &b).expect("join");
        let previous: Assignment = [
            ("a".to_string(), Membership::Assigned(id)),
            ("b".to_string(), Membership::Assigned(id)),
        ]
        .into_iter()
        .collect();

        let sample = sample(10);
        // Step 1 adds nothing (no data in [10, 20)), so the center is a + b.
        let rho = similarity(&a, &arena.get(id).expect("live").center, &sample);
        let config = exact();
        let reconciler = CheckpointReconciler::new(&workload, rho, &config);

        let outcome = reconciler
            .reconcile(window(0, 10, 20), &sample, &mut arena, &previous)
            .expect("reconcile");

        assert_eq!(outcome.stats.quit, 1, "score == rho must demote");
        // "a" left and has no activity in [10, 20), so it is not re-placed.
        assert_eq!(outcome.assignment["a"], Membership::Unassigned);
        assert_eq!(outcome.assignment["b"], Membership::Assigned(id));
        assert_eq!(outcome.stats.recreated, 0);
        assert_eq!(arena.next_id(), 1);
        println!("[PASS] test_similarity_exactly_rho_is_not_retained - rho={:.6}", rho);
    }

    #[test]
    fn test_similarity_just_above_rho_is_retained() {
        let a = series(&[(0, 4), (1, 1)]);
        let b = series(&[(0, 1), (1, 4)]);
        let workload = Workload::from_series([("a", a.clone()), ("b", b.clone())]);

        let mut arena = ClusterArena::new();
        let id = arena.create(ts(0), ts(10), &a);
        arena.join(id, ts(0), ts(10), &b).expect("join");
        let previous: Assignment = [
            ("a".to_string(), Membership::Assigned(id)),
            ("b".to_string(), Membership::Assigned(id)),
        ]
        .into_iter()
        .collect();

        let sample = sample(10);
        let score = similarity(&a, &arena.get(id).expect("live").center, &sample);
        let config = exact();
        let reconciler = CheckpointReconciler::new(&workload, score - 1e-9, &config);

        let outcome = reconciler
            .reconcile(window(0, 10, 20), &sample, &mut arena, &previous)
            .expect("reconcile");

        assert_eq!(outcome.stats.quit, 0);
        assert_eq!(outcome.assignment["a"], Membership::Assigned(id));
    }

    #[test]
    fn test_singleton_never_abandoned() {
        let a = series(&[(0, 10)]);
        let workload = Workload::from_series([("a", a.clone())]);
        let mut arena = ClusterArena::new();
        let id = arena.create(ts(0), ts(10), &series(&[(5, 10)]));
        let previous: Assignment = [("a".to_string(), Membership::Assigned(id))]
            .into_iter()
            .collect();

        let config = exact();
        let reconciler = CheckpointReconciler::new(&workload, 0.8, &config);
        let outcome = reconciler
            .reconcile(window(0, 10, 20), &sample(20), &mut arena, &previous)
            .expect("reconcile");

        assert_eq!(outcome.assignment["a"], Membership::Assigned(id));
        assert_eq!(outcome.stats.retained, 1);
    }

    #[test]
    fn test_demotion_removes_template_contribution() {
        let a = series(&[(0, 10), (1, 0), (2, 10)]);
        let b = series(&[(1, 10), (3, 10)]);
        let c = series(&[(1, 10), (3, 10)]);
        let workload = Workload::from_series([
            ("a", a.clone()),
            ("b", b.clone()),
            ("c", c.clone()),
        ]);

        let mut arena = ClusterArena::new();
        let id = arena.create(ts(0), ts(10), &a);
        arena.join(id, ts(0), ts(10), &b).expect("join");
        arena.join(id, ts(0), ts(10), &c).expect("join");
        let previous: Assignment = ["a", "b", "c"]
            .iter()
            .map(|t| (t.to_string(), Membership::Assigned(id)))
            .collect();

        let mut expected_center = TimeSeries::new();
        adjust(&mut expected_center, ts(0), ts(10), &b, Direction::Add);
        adjust(&mut expected_center, ts(0), ts(10), &c, Direction::Add);

        let config = exact();
        let reconciler = CheckpointReconciler::new(&workload, 0.8, &config);
        let sample = sample(10);
        let outcome = reconciler
            .reconcile(window(0, 10, 20), &sample, &mut arena, &previous)
            .expect("reconcile");

        assert_eq!(outcome.stats.quit, 1);
        assert_eq!(arena.get(id).expect("live").center, expected_center);
        assert_eq!(arena.get(id).expect("live").size, 2);
        assert_eq!(outcome.assignment["a"], Membership::Unassigned);

        // Re-evaluating "a" against the adjusted center sees only b + c.
        let after = similarity(&a, &arena.get(id).expect("live").center, &sample);
        let reference = similarity(&a, &expected_center, &sample);
        assert_eq!(after, reference);
        assert_eq!(after, 0.0);
        println!("[PASS] test_demotion_removes_template_contribution - no residual score");
    }

    #[test]
    fn test_merge_chain_resolves_to_final_root() {
        // Three clusters with nearly identical shapes; ascending-order
        // merging folds 0 -> 1, then 2 resolves through 0's set to 1.
        let workload = Workload::from_series([
            ("a", series(&[(0, 10), (1, 10), (2, 11)])),
            ("b", series(&[(0, 10), (1, 11), (2, 10)])),
            ("c", series(&[(0, 11), (1, 10), (2, 10)])),
        ]);
        let mut arena = ClusterArena::new();
        let a = arena.create(ts(0), ts(10), &workload.get("a").expect("a").series);
        let b = arena.create(ts(0), ts(10), &workload.get("b").expect("b").series);
        let c = arena.create(ts(0), ts(10), &workload.get("c").expect("c").series);
        let previous: Assignment = [
            ("a".to_string(), Membership::Assigned(a)),
            ("b".to_string(), Membership::Assigned(b)),
            ("c".to_string(), Membership::Assigned(c)),
        ]
        .into_iter()
        .collect();

        let config = exact();
        let reconciler = CheckpointReconciler::new(&workload, 0.8, &config);
        let outcome = reconciler
            .reconcile(window(0, 10, 20), &sample(10), &mut arena, &previous)
            .expect("reconcile");

        assert_eq!(arena.len(), 1, "all three collapse into one cluster");
        let survivor = arena.live_ids()[0];
        for t in ["a", "b", "c"] {
            assert_eq!(outcome.assignment[t], Membership::Assigned(survivor));
        }
        assert_eq!(arena.get(survivor).expect("live").size, 3);
        assert_eq!(outcome.stats.merged, 2);
        println!("[PASS] test_merge_chain_resolves_to_final_root - survivor {}", survivor);
    }
    #[test]
    fn test_demoted_quiet_template_becomes_unassigned() {
        let workload = Workload::from_series([
            ("a", series(&[(0, 10), (2, 10)])),
            ("b", series(&[(1, 10), (3, 10)])),
            ("c", series(&[(1, 10), (3, 10)])),
        ]);
        let mut arena = ClusterArena::new();
        let id = arena.create(ts(0), ts(10), &workload.get("a").expect("a").series);
        arena.join(id, ts(0), ts(10), &workload.get("b").expect("b").series).expect("join");
        arena.join(id, ts(0), ts(10), &workload.get("c").expect("c").series).expect("join");
        let previous: Assignment = ["a", "b", "c"]
            .iter()
            .map(|t| (t.to_string(), Membership::Assigned(id)))
            .collect();

        let config = exact();
        let reconciler = CheckpointReconciler::new(&workload, 0.8, &config);
        let outcome = reconciler
            .reconcile(window(0, 10, 20), &sample(10), &mut arena, &previous)
            .expect("reconcile");

        println!("STATE AFTER: a={:?} stats={:?}", outcome.assignment["a"], outcome.stats);
        assert_eq!(outcome.assignment["a"], Membership::Unassigned);
        assert_eq!(outcome.stats.quit, 1);
        assert_eq!(outcome.stats.retained, 2);
        assert_eq!(outcome.stats.recreated, 0);
        assert_eq!(outcome.stats.reassigned, 0);
        assert_eq!(arena.next_id(), 1, "no cluster founded for a silent template");
        println!("[PASS] test_demoted_quiet_template_becomes_unassigned");
    }

    #[test]
    fn test_demoted_active_template_founds_new_cluster() {
        let workload = Workload::from_series([
            ("a", series(&[(0, 10), (2, 10), (12, 10)])),
            ("b", series(&[(1, 10), (3, 10)])),
            ("c", series(&[(1, 10), (3, 10)])),
        ]);
        let mut arena = ClusterArena::new();
        let id = arena.create(ts(0), ts(10), &workload.get("a").expect("a").series);
        arena.join(id, ts(0), ts(10), &workload.get("b").expect("b").series).expect("join");
        arena.join(id, ts(0), ts(10), &workload.get("c").expect("c").series).expect("join");
        let previous: Assignment = ["a", "b", "c"]
            .iter()
            .map(|t| (t.to_string(), Membership::Assigned(id)))
            .collect();

        let config = exact();
        let reconciler = CheckpointReconciler::new(&workload, 0.8, &config);
        let outcome = reconciler
            .reconcile(window(0, 10, 20), &sample(20), &mut arena, &previous)
            .expect("reconcile");

        assert_eq!(outcome.stats.quit, 1);
        assert_eq!(outcome.stats.recreated, 1);
        assert_eq!(outcome.assignment["a"], Membership::Assigned(1));
        assert_eq!(outcome.assignment["b"], Membership::Assigned(id));
        assert_eq!(arena.get(id).expect("live").center, series(&[(1, 20), (3, 20)]));
        println!("[PASS] test_demoted_active_template_founds_new_cluster");
    }

    #[test]
    fn test_merge_is_transitive_within_one_pass() {
        // 0 merges into 1; 1, now holding 0, merges into 2. Cluster 3 is
        // orthogonal to everything and survives on its own.
        let workload = Workload::from_series([
            ("a", series(&[(0, 4), (1, 2)])),
            ("b", series(&[(0, 20), (1, 30)])),
            ("c", series(&[(0, 20), (1, 40)])),
            ("d", series(&[(2, 50)])),
        ]);
        let mut arena = ClusterArena::new();
        let mut previous = Assignment::new();
        for t in ["a", "b", "c", "d"] {
            let id = arena.create(ts(0), ts(10), &workload.get(t).expect("template").series);
            previous.insert(t.to_string(), Membership::Assigned(id));
        }
        println!("STATE BEFORE: {} live clusters", arena.len());

        let config = exact();
        let reconciler = CheckpointReconciler::new(&workload, 0.8, &config);
        let outcome = reconciler
            .reconcile(window(0, 10, 20), &sample(10), &mut arena, &previous)
            .expect("reconcile");

        println!("STATE AFTER: live={:?} stats={:?}", arena.live_ids(), outcome.stats);
        assert_eq!(outcome.stats.merged, 2);
        assert_eq!(arena.live_ids(), vec![2, 3]);
        for t in ["a", "b", "c"] {
            assert_eq!(outcome.assignment[t], Membership::Assigned(2), "{} ends in the final root", t);
        }
        assert_eq!(outcome.assignment["d"], Membership::Assigned(3));
        let root = arena.get(2).expect("live");
        assert_eq!(root.size, 3);
        assert_eq!(root.center, series(&[(0, 44), (1, 72)]));
        println!("[PASS] test_merge_is_transitive_within_one_pass - 0 -> 1 -> 2");
    }
}
