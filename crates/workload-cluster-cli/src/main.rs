//! Workload Cluster CLI
//!
//! Command line driver for template clustering and coverage analysis.
//!
//! # Commands
//!
//! - `cluster`: Load template traces, run the online clustering, write the result
//! - `coverage`: Measure how much recent volume the largest clusters cover and
//!   export their series
//!
//! Exit code 0 on success, 1 on error.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};
use workload_cluster_core::config::LoggingConfig;

mod commands;

/// Workload Cluster - Online clustering of SQL template arrival rates
#[derive(Parser)]
#[command(name = "workload-cluster")]
#[command(version)]
#[command(about = "Cluster SQL query templates by arrival-rate pattern")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file (defaults to config/ layering and environment)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a directory of template traces
    ///
    /// Writes the assignment history, cluster count and per-cluster totals
    /// as JSON.
    Cluster(commands::cluster::ClusterArgs),
    /// Compute cluster coverage from a stored clustering
    ///
    /// Writes coverage.json and one CSV per top cluster under clusters/.
    Coverage(commands::coverage::CoverageArgs),
}

fn main() {
    let cli = Cli::parse();

    let loaded = commands::load_config(cli.config.as_deref());
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_logging(cli.verbose, &logging);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let exit_code = match cli.command {
        Commands::Cluster(args) => commands::cluster::handle_cluster(args, config),
        Commands::Coverage(args) => commands::coverage::handle_coverage(args, config),
    };

    std::process::exit(exit_code);
}

/// Install the stderr subscriber. `-v` flags win over `RUST_LOG`, which wins
/// over the configured level.
fn init_logging(verbose: u8, logging: &LoggingConfig) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level)),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    match logging.format.as_str() {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        _ => builder.pretty().init(),
    }
}
