//! Clustering result persistence.
//!
//! A [`ClusteringResult`] is the full output of one run: the number of cluster
//! ids issued, the per-checkpoint assignment history and the cumulative volume
//! of every cluster ever created. It is stored as JSON with memberships
//! encoded as integers (`-1` for unassigned), so downstream tools can read it
//! without knowing about [`Membership`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use workload_cluster_core::clustering::ClusteringResult;
//!
//! result.save(Path::new("assignments.json"))?;
//! let restored = ClusteringResult::load(Path::new("assignments.json"))?;
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::series::Timestamp;

use super::membership::{Assignment, ClusterId, Membership};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while storing or reading a clustering result.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading or writing the result file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Structurally valid JSON that breaks a result invariant.
    #[error("Invalid data: {message}")]
    InvalidData {
        /// Description of what's wrong with the data
        message: String,
    },
}

impl PersistenceError {
    /// Create an InvalidData error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }
}

// =============================================================================
// Checkpoint
// =============================================================================

/// Assignment snapshot taken at one checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint stamp: `min_date` for the initial snapshot, otherwise the
    /// end of the period just processed.
    pub timestamp: Timestamp,

    /// Membership of every template at this checkpoint.
    pub assignment: Assignment,
}

impl Checkpoint {
    pub fn new(timestamp: Timestamp, assignment: Assignment) -> Self {
        Self {
            timestamp,
            assignment,
        }
    }

    /// Templates assigned to `cluster` at this checkpoint.
    pub fn members(&self, cluster: ClusterId) -> impl Iterator<Item = &str> {
        self.assignment
            .iter()
            .filter(move |(_, m)| **m == Membership::Assigned(cluster))
            .map(|(text, _)| text.as_str())
    }

    /// Distinct clusters referenced at this checkpoint, ascending.
    pub fn clusters(&self) -> Vec<ClusterId> {
        let mut ids: Vec<ClusterId> = self
            .assignment
            .values()
            .filter_map(|m| m.cluster())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

// =============================================================================
// ClusteringResult
// =============================================================================

/// Output of a full clustering run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    /// Number of cluster ids issued; every id in the history is below it.
    pub num_clusters: u64,

    /// Assignment history, starting with the all-unassigned snapshot.
    pub assignments: Vec<Checkpoint>,

    /// Cumulative query volume per cluster id, including merged-away ids.
    pub cluster_totals: BTreeMap<ClusterId, i64>,
}

impl ClusteringResult {
    /// The last assignment snapshot, if any checkpoint was recorded.
    pub fn final_assignment(&self) -> Option<&Assignment> {
        self.assignments.last().map(|c| &c.assignment)
    }

    /// Number of checkpoints processed (the initial snapshot excluded).
    pub fn checkpoint_count(&self) -> usize {
        self.assignments.len().saturating_sub(1)
    }

    /// Sum of every cluster's cumulative volume.
    pub fn total_volume(&self) -> i64 {
        self.cluster_totals.values().sum()
    }

    /// Check that no membership references an id that was never issued and
    /// that the history is in time order.
    pub fn validate(&self) -> Result<(), PersistenceError> {
        for pair in self.assignments.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(PersistenceError::invalid_data(format!(
                    "checkpoint {} does not follow {}",
                    pair[1].timestamp, pair[0].timestamp
                )));
            }
        }
        for checkpoint in &self.assignments {
            if let Some(id) = checkpoint
                .assignment
                .values()
                .filter_map(|m| m.cluster())
                .find(|&id| id >= self.num_clusters)
            {
                return Err(PersistenceError::invalid_data(format!(
                    "checkpoint {} references cluster {} but only {} were issued",
                    checkpoint.timestamp, id, self.num_clusters
                )));
            }
        }
        Ok(())
    }

    /// Serialize the result to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        let json = serde_json::to_vec(self)?;
        Ok(json)
    }

    /// Serialize the result to pretty-printed JSON bytes.
    pub fn to_bytes_pretty(&self) -> Result<Vec<u8>, PersistenceError> {
        let json = serde_json::to_vec_pretty(self)?;
        Ok(json)
    }

    /// Deserialize and validate a result from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistenceError> {
        let result: Self = serde_json::from_slice(bytes)?;
        result.validate()?;
        Ok(result)
    }

    /// Write the result as JSON to `path`.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a result previously written by [`ClusteringResult::save`].
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let bytes = fs::read(path).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }
}
