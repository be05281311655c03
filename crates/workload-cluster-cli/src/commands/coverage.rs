//! `coverage` command: stored clustering in, coverage report and cluster
//! series out.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::{error, info};
use workload_cluster_core::clustering::ClusteringResult;
use workload_cluster_core::coverage::CoverageReport;
use workload_cluster_core::{load_workload, Config, CoverageAnalyzer};

/// Arguments for the coverage command.
#[derive(Args)]
pub struct CoverageArgs {
    /// Directory of per-template CSV traces used for the clustering
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Clustering result written by `cluster`
    #[arg(short, long)]
    pub assignments: PathBuf,

    /// Receives coverage.json and clusters/<id>.csv
    #[arg(short, long)]
    pub output_dir: PathBuf,
}

/// Handle the coverage command. Returns the process exit code.
pub fn handle_coverage(args: CoverageArgs, config: Config) -> i32 {
    match run_coverage(&args, &config) {
        Ok(report) => {
            for (k, share) in report.coverage.iter().enumerate() {
                println!("Top {} coverage: {:.4}", k + 1, share);
            }
            println!("Checkpoints evaluated: {}", report.checkpoints.len());
            println!("Output: {}", args.output_dir.display());
            0
        }
        Err(e) => {
            error!("Coverage analysis failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

fn run_coverage(args: &CoverageArgs, config: &Config) -> anyhow::Result<CoverageReport> {
    let result = ClusteringResult::load(&args.assignments)
        .with_context(|| format!("reading {}", args.assignments.display()))?;
    let workload = load_workload(&args.dir)
        .with_context(|| format!("loading traces from {}", args.dir.display()))?;

    let analyzer = CoverageAnalyzer::new(config.coverage.clone());
    let analysis = analyzer.analyze(&workload, &result)?;

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let clusters_dir = args.output_dir.join("clusters");
    if clusters_dir.exists() {
        fs::remove_dir_all(&clusters_dir)
            .with_context(|| format!("clearing {}", clusters_dir.display()))?;
    }
    let exported = analyzer.export_cluster_series(&clusters_dir, &analysis.cluster_series)?;
    analysis.report.save(&args.output_dir.join("coverage.json"))?;

    info!(
        "Coverage {:?} over {} checkpoints; {} cluster series exported",
        analysis.report.coverage,
        analysis.report.checkpoints.len(),
        exported
    );
    Ok(analysis.report)
}
