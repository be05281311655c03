//! Configuration for the clustering engine, coverage analysis and logging.

use serde::{Deserialize, Serialize};

use crate::clustering::similarity::DEFAULT_SAMPLE_CAP;
use crate::error::{ClusterError, ClusterResult};

/// Default similarity threshold for membership and merges.
pub const DEFAULT_RHO: f64 = 0.8;

/// Default spacing between checkpoints: one day.
pub const DEFAULT_CLUSTER_GAP_MINUTES: i64 = 1440;

/// Default lookback window for similarity.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Longest accepted lookback window (one century); keeps date arithmetic in range.
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// Longest accepted checkpoint gap, in minutes.
pub const MAX_CLUSTER_GAP_MINUTES: i64 = MAX_LOOKBACK_DAYS * 1440;

/// hnsw_rs refuses graphs deeper than this.
const HNSW_MAX_LAYER_LIMIT: usize = 16;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub coverage: CoverageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in order:
    /// 1. config/default.toml (base settings)
    /// 2. config/{WORKLOAD_CLUSTER_ENV}.toml (environment-specific)
    /// 3. Environment variables with WORKLOAD_CLUSTER__ prefix
    pub fn load() -> ClusterResult<Self> {
        let env =
            std::env::var("WORKLOAD_CLUSTER_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix("WORKLOAD_CLUSTER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> ClusterResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClusterError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> ClusterResult<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| ClusterError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> ClusterResult<()> {
        self.clustering.validate()?;
        self.index.validate()?;
        self.coverage.validate()?;
        Ok(())
    }
}

// =============================================================================
// ClusteringConfig
// =============================================================================

/// Parameters of the online clustering engine.
///
/// # Example
///
/// ```
/// use workload_cluster_core::config::ClusteringConfig;
///
/// let config = ClusteringConfig::default().with_rho(0.9).with_seed(7);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.cluster_gap_minutes, 1440);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Similarity a template or cluster must exceed to be grouped.
    pub rho: f64,

    /// Minutes between checkpoints.
    pub cluster_gap_minutes: i64,

    /// Trailing days of history compared at each checkpoint.
    pub lookback_days: i64,

    /// Maximum number of timestamps compared per checkpoint.
    pub sample_cap: usize,

    /// Seed for the timestamp sampler. `None` draws a fresh seed per run,
    /// so long windows are compared on different samples each time.
    pub seed: Option<u64>,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            rho: DEFAULT_RHO,
            cluster_gap_minutes: DEFAULT_CLUSTER_GAP_MINUTES,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            sample_cap: DEFAULT_SAMPLE_CAP,
            seed: None,
        }
    }
}

impl ClusteringConfig {
    #[must_use]
    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = rho;
        self
    }

    #[must_use]
    pub fn with_cluster_gap_minutes(mut self, minutes: i64) -> Self {
        self.cluster_gap_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }

    #[must_use]
    pub fn with_sample_cap(mut self, cap: usize) -> Self {
        self.sample_cap = cap;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate parameters.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::InvalidParameter` if:
    /// - rho is not strictly between 0 and 1
    /// - cluster_gap_minutes, lookback_days or sample_cap is not positive
    /// - cluster_gap_minutes or lookback_days exceeds one century
    pub fn validate(&self) -> ClusterResult<()> {
        if !(self.rho > 0.0 && self.rho < 1.0) {
            return Err(ClusterError::invalid_parameter(format!(
                "rho must be in (0, 1), got {}",
                self.rho
            )));
        }
        if self.cluster_gap_minutes <= 0 {
            return Err(ClusterError::invalid_parameter(format!(
                "cluster_gap_minutes must be > 0, got {}",
                self.cluster_gap_minutes
            )));
        }
        if self.cluster_gap_minutes > MAX_CLUSTER_GAP_MINUTES {
            return Err(ClusterError::invalid_parameter(format!(
                "cluster_gap_minutes must be <= {}, got {}",
                MAX_CLUSTER_GAP_MINUTES, self.cluster_gap_minutes
            )));
        }
        if self.lookback_days <= 0 || self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(ClusterError::invalid_parameter(format!(
                "lookback_days must be in 1..={}, got {}",
                MAX_LOOKBACK_DAYS, self.lookback_days
            )));
        }
        if self.sample_cap == 0 {
            return Err(ClusterError::invalid_parameter(
                "sample_cap must be > 0; similarity needs at least one timestamp",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// IndexConfig
// =============================================================================

/// Nearest-center index implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Approximate HNSW graph.
    #[default]
    Hnsw,
    /// Brute-force scan.
    Exact,
}

impl std::str::FromStr for IndexBackend {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hnsw" => Ok(IndexBackend::Hnsw),
            "exact" => Ok(IndexBackend::Exact),
            other => Err(ClusterError::invalid_parameter(format!(
                "unknown index backend '{}', expected 'hnsw' or 'exact'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    /// HNSW `M`: links per node.
    pub max_connections: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_layer: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Hnsw,
            max_connections: 16,
            ef_construction: 200,
            ef_search: 64,
            max_layer: HNSW_MAX_LAYER_LIMIT,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> ClusterResult<()> {
        if self.max_connections == 0 || self.ef_construction == 0 || self.ef_search == 0 {
            return Err(ClusterError::invalid_parameter(
                "index max_connections, ef_construction and ef_search must be > 0",
            ));
        }
        if self.max_layer == 0 || self.max_layer > HNSW_MAX_LAYER_LIMIT {
            return Err(ClusterError::invalid_parameter(format!(
                "index max_layer must be in 1..={}, got {}",
                HNSW_MAX_LAYER_LIMIT, self.max_layer
            )));
        }
        Ok(())
    }
}

// =============================================================================
// CoverageConfig
// =============================================================================

/// Parameters of the post-hoc coverage analysis.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Number of largest clusters tracked per checkpoint.
    pub max_cluster_num: usize,

    /// A template's cumulative total only counts if its last observation is
    /// this recent relative to the checkpoint.
    pub last_total_gap_seconds: i64,

    /// How far past each checkpoint the exported cluster series extend.
    pub record_ahead_days: i64,

    /// Bucket width of the exported cluster series.
    pub aggregate_minutes: u32,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            max_cluster_num: 3,
            last_total_gap_seconds: 86_400,
            record_ahead_days: 30,
            aggregate_minutes: 10,
        }
    }
}

impl CoverageConfig {
    pub fn validate(&self) -> ClusterResult<()> {
        if self.max_cluster_num == 0 {
            return Err(ClusterError::invalid_parameter(
                "coverage max_cluster_num must be > 0",
            ));
        }
        if self.aggregate_minutes == 0 || 60 % self.aggregate_minutes != 0 {
            return Err(ClusterError::invalid_parameter(format!(
                "coverage aggregate_minutes must divide 60, got {}",
                self.aggregate_minutes
            )));
        }
        if self.last_total_gap_seconds <= 0 || self.record_ahead_days < 0 {
            return Err(ClusterError::invalid_parameter(
                "coverage last_total_gap_seconds must be > 0 and record_ahead_days >= 0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// LoggingConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// One of `pretty`, `compact`, `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
