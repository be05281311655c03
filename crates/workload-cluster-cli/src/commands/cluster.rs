//! `cluster` command: trace directory in, clustering result out.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueEnum};
use tracing::{error, info};
use workload_cluster_core::clustering::{ClusteringResult, OnlineClusterer};
use workload_cluster_core::config::IndexBackend;
use workload_cluster_core::{load_workload, Config};

/// Nearest-center index used to propose candidate clusters.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum IndexArg {
    /// Approximate HNSW graph
    Hnsw,
    /// Brute-force scan
    Exact,
}

impl From<IndexArg> for IndexBackend {
    fn from(arg: IndexArg) -> Self {
        match arg {
            IndexArg::Hnsw => IndexBackend::Hnsw,
            IndexArg::Exact => IndexBackend::Exact,
        }
    }
}

/// Arguments for the cluster command.
#[derive(Args)]
pub struct ClusterArgs {
    /// Directory of per-template CSV traces (searched recursively)
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Where to write the clustering result (JSON)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Similarity threshold in (0, 1)
    #[arg(long)]
    pub rho: Option<f64>,

    /// Minutes between checkpoints
    #[arg(long)]
    pub gap: Option<i64>,

    /// Seed for timestamp sampling; unseeded runs are not reproducible
    #[arg(long)]
    pub seed: Option<u64>,

    /// Nearest-center index backend
    #[arg(long)]
    pub index: Option<IndexArg>,
}

/// Handle the cluster command. Returns the process exit code.
pub fn handle_cluster(args: ClusterArgs, config: Config) -> i32 {
    match run_cluster(&args, config) {
        Ok(result) => {
            println!("Clusters: {}", result.num_clusters);
            println!("Checkpoints: {}", result.checkpoint_count());
            println!("Total volume: {}", result.total_volume());
            println!("Output: {}", args.output.display());
            0
        }
        Err(e) => {
            error!("Clustering failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

fn run_cluster(args: &ClusterArgs, mut config: Config) -> anyhow::Result<ClusteringResult> {
    apply_overrides(args, &mut config);

    let workload = load_workload(&args.dir)
        .with_context(|| format!("loading traces from {}", args.dir.display()))?;
    let clusterer = OnlineClusterer::new(config.clustering, config.index)?;
    let result = clusterer.run(&workload)?;

    result
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        "Wrote {} checkpoints and {} clusters to {}",
        result.checkpoint_count(),
        result.num_clusters,
        args.output.display()
    );
    Ok(result)
}

fn apply_overrides(args: &ClusterArgs, config: &mut Config) {
    if let Some(rho) = args.rho {
        config.clustering.rho = rho;
    }
    if let Some(gap) = args.gap {
        config.clustering.cluster_gap_minutes = gap;
    }
    if let Some(seed) = args.seed {
        config.clustering.seed = Some(seed);
    }
    if let Some(index) = args.index {
        config.index.backend = index.into();
    }
}
