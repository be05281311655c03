//! Checkpoint clock of the online clustering engine.
//!
//! [`OnlineClusterer::run`] walks from the workload's first timestamp to its
//! last in steps of `cluster_gap_minutes`, reconciling each period and
//! recording the assignment after it. A trailing period shorter than one gap
//! is not processed.
//!
//! For step-by-step inspection, [`OnlineClusterer::session`] exposes the same
//! loop one checkpoint at a time.

use std::cmp::max;

use chrono::Duration;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::{ClusteringConfig, IndexConfig};
use crate::error::{ClusterError, ClusterResult};
use crate::series::{add_minutes, minutes_between, Timestamp};
use crate::workload::Workload;

use super::cluster::ClusterArena;
use super::membership::{Assignment, Membership};
use super::persistence::{Checkpoint, ClusteringResult};
use super::reconciler::{CheckpointReconciler, CheckpointStats, CheckpointWindow};
use super::similarity::SampleIndex;

/// Entry point of the engine: configuration plus the run loop.
#[derive(Debug, Clone, Default)]
pub struct OnlineClusterer {
    config: ClusteringConfig,
    index: IndexConfig,
}

impl OnlineClusterer {
    /// Create a clusterer after validating both configurations.
    pub fn new(config: ClusteringConfig, index: IndexConfig) -> ClusterResult<Self> {
        config.validate()?;
        index.validate()?;
        Ok(Self { config, index })
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    pub fn index_config(&self) -> &IndexConfig {
        &self.index
    }

    /// Cluster `workload` from start to end.
    ///
    /// # Errors
    ///
    /// [`ClusterError::EmptyWorkload`] when the workload has no data points.
    pub fn run(&self, workload: &Workload) -> ClusterResult<ClusteringResult> {
        let mut session = self.session(workload)?;
        while session.step()?.is_some() {}
        Ok(session.finish())
    }

    /// Start a run that the caller advances with [`ClusteringSession::step`].
    pub fn session<'w>(&self, workload: &'w Workload) -> ClusterResult<ClusteringSession<'w>> {
        let (min_date, max_date) = workload.span().ok_or(ClusterError::EmptyWorkload)?;

        let total_minutes = minutes_between(min_date, max_date) + 1;
        let num_gaps = total_minutes / self.config.cluster_gap_minutes;

        let rng = match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => {
                debug!("No sampling seed configured; using entropy");
                ChaCha8Rng::from_entropy()
            }
        };

        let assignment: Assignment = workload
            .names()
            .map(|name| (name.to_string(), Membership::Unassigned))
            .collect();

        info!(
            "Clustering {} templates from {} to {}: {} checkpoint(s) of {} minutes, rho={}",
            workload.len(),
            min_date,
            max_date,
            num_gaps,
            self.config.cluster_gap_minutes,
            self.config.rho
        );

        Ok(ClusteringSession {
            workload,
            config: self.config.clone(),
            index: self.index.clone(),
            rng,
            arena: ClusterArena::new(),
            history: vec![Checkpoint::new(min_date, assignment.clone())],
            assignment,
            min_date,
            current: min_date,
            remaining: num_gaps,
        })
    }
}

/// Running state of one clustering run.
#[derive(Debug)]
pub struct ClusteringSession<'w> {
    workload: &'w Workload,
    config: ClusteringConfig,
    index: IndexConfig,
    rng: ChaCha8Rng,
    arena: ClusterArena,
    assignment: Assignment,
    history: Vec<Checkpoint>,
    min_date: Timestamp,
    current: Timestamp,
    remaining: i64,
}

impl ClusteringSession<'_> {
    /// Process the next checkpoint. Returns `None` once every full gap has
    /// been processed.
    pub fn step(&mut self) -> ClusterResult<Option<CheckpointStats>> {
        if self.remaining <= 0 {
            return Ok(None);
        }

        let next = add_minutes(self.current, self.config.cluster_gap_minutes);
        let floor = max(self.min_date, next - Duration::days(self.config.lookback_days));
        let window = CheckpointWindow {
            floor,
            current: self.current,
            next,
        };
        let sample = SampleIndex::for_window(floor, next, self.config.sample_cap, &mut self.rng);

        let reconciler = CheckpointReconciler::new(self.workload, self.config.rho, &self.index);
        let outcome = reconciler.reconcile(window, &sample, &mut self.arena, &self.assignment)?;

        let stats = outcome.stats;
        info!(
            "{}: {} live clusters ({} issued), retained={} quit={} joined={} reassigned={} created={} recreated={} merged={}",
            next,
            self.arena.len(),
            self.arena.next_id(),
            stats.retained,
            stats.quit,
            stats.joined,
            stats.reassigned,
            stats.created,
            stats.recreated,
            stats.merged
        );

        self.assignment = outcome.assignment;
        self.history
            .push(Checkpoint::new(next, self.assignment.clone()));
        self.current = next;
        self.remaining -= 1;
        Ok(Some(stats))
    }

    /// Start of the next period to process.
    pub fn current(&self) -> Timestamp {
        self.current
    }

    /// Checkpoints left to process.
    pub fn remaining(&self) -> usize {
        self.remaining.max(0) as usize
    }

    pub fn arena(&self) -> &ClusterArena {
        &self.arena
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    pub fn history(&self) -> &[Checkpoint] {
        &self.history
    }

    /// Stop the run and package its output.
    pub fn finish(self) -> ClusteringResult {
        ClusteringResult {
            num_clusters: self.arena.next_id(),
            assignments: self.history,
            cluster_totals: self.arena.totals(),
        }
    }
}
