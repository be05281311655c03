//! Workload Cluster Core Library
//!
//! Groups SQL query templates whose arrival-rate time series behave alike,
//! and tracks how the grouping evolves as new data arrives.
//!
//! # Architecture
//!
//! This crate defines:
//! - The workload model (`Template`, `Workload`, `TimeSeries`)
//! - The online clustering engine (`clustering::OnlineClusterer`)
//! - Loading of per-template CSV traces (`loader`)
//! - JSON persistence of clustering results (`clustering::ClusteringResult`)
//! - Coverage analysis over a stored clustering (`coverage`)
//! - Configuration and error types
//!
//! # Example
//!
//! ```
//! use workload_cluster_core::clustering::OnlineClusterer;
//! use workload_cluster_core::config::{ClusteringConfig, IndexConfig};
//! use workload_cluster_core::series::{add_minutes, TimeSeries};
//! use workload_cluster_core::Workload;
//!
//! let start = chrono::NaiveDate::from_ymd_opt(2017, 1, 1)
//!     .and_then(|d| d.and_hms_opt(0, 0, 0))
//!     .unwrap();
//! let series: TimeSeries = (0..120).map(|m| (add_minutes(start, m), 1)).collect();
//! let workload = Workload::from_series([("SELECT 1", series)]);
//!
//! let config = ClusteringConfig::default().with_cluster_gap_minutes(60).with_seed(1);
//! let result = OnlineClusterer::new(config, IndexConfig::default())
//!     .unwrap()
//!     .run(&workload)
//!     .unwrap();
//! assert_eq!(result.num_clusters, 1);
//! ```

pub mod clustering;
pub mod config;
pub mod coverage;
pub mod error;
pub mod loader;
pub mod series;
pub mod workload;

// Re-exports for convenience
pub use clustering::{ClusteringResult, Membership, OnlineClusterer};
pub use config::Config;
pub use coverage::{CoverageAnalyzer, CoverageReport};
pub use error::{ClusterError, ClusterResult, LoadError, LoadResult};
pub use loader::load_workload;
pub use series::{TimeSeries, Timestamp};
pub use workload::{Template, Workload};
