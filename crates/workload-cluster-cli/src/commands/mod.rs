//! CLI command handlers
//!
//! # Modules
//!
//! - `cluster`: Run the online clustering over a trace directory
//! - `coverage`: Coverage analysis and cluster series export

use std::path::Path;

use anyhow::Context;
use workload_cluster_core::Config;

pub mod cluster;
pub mod coverage;

/// Read `path` if given, otherwise layer `config/` files and the environment.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Config::load().context("loading layered configuration"),
    }
}
