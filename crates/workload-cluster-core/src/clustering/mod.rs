//! Incremental online clustering of template arrival-rate series.
//!
//! Templates are grouped by the shape of their query arrival rate. The
//! grouping is revised at fixed checkpoints using only a bounded lookback
//! window, so a run never reprocesses the full history.
//!
//! # Key Types
//!
//! - [`OnlineClusterer`]: Checkpoint clock; runs a workload end to end
//! - [`ClusteringSession`]: The same loop, advanced one checkpoint at a time
//! - [`CheckpointReconciler`]: Per-checkpoint join / demote / create / merge pass
//! - [`ClusterArena`]: Owner of cluster centers, sizes and totals
//! - [`CenterIndex`]: Nearest-center lookup over the live clusters
//! - [`SampleIndex`]: Timestamps compared by [`similarity`]
//! - [`Membership`]: A template's cluster, or unassigned
//! - [`ClusteringResult`]: Persisted output of a run

pub mod center;
pub mod cluster;
pub mod driver;
pub mod index;
pub mod membership;
pub mod persistence;
pub mod reconciler;
pub mod similarity;
pub mod union_find;

pub use center::{adjust, Direction};
pub use cluster::{Cluster, ClusterArena};
pub use driver::{ClusteringSession, OnlineClusterer};
pub use index::{CenterIndex, ExactCenterIndex, HnswCenterIndex, IndexMode, NearestCenterIndex};
pub use membership::{Assignment, ClusterId, Membership, UNASSIGNED_CLUSTER_ID};
pub use persistence::{Checkpoint, ClusteringResult, PersistenceError};
pub use reconciler::{CheckpointReconciler, CheckpointStats, CheckpointWindow, ReconcileOutcome};
pub use similarity::{exceeds_threshold, similarity, SampleIndex, DEFAULT_SAMPLE_CAP, SIMILARITY_EPSILON};
pub use union_find::UnionFind;
