//! Error types for workload-cluster-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the clustering engine and its configuration.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Invalid parameter provided.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of what's wrong with the parameter
        message: String,
    },

    /// The workload has no data points, so no time span can be derived.
    #[error("Workload contains no data points")]
    EmptyWorkload,

    /// A cluster handle that is not (or no longer) live was used.
    #[error("Unknown cluster: {0}")]
    UnknownCluster(u64),

    /// The nearest-center index could not be built or queried.
    #[error("Index error: {message}")]
    Index {
        /// Details from the index backend
        message: String,
    },

    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClusterError {
    /// Create an InvalidParameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create an Index error.
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ClusterError {
    fn from(err: config::ConfigError) -> Self {
        ClusterError::Config(err.to_string())
    }
}

/// Result type alias for engine operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors raised while reading template trace files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid timestamp '{value}' in {path}")]
    InvalidTimestamp { path: PathBuf, value: String },

    #[error("Invalid count '{value}' in {path}")]
    InvalidCount { path: PathBuf, value: String },

    #[error("No template files found under {path}")]
    NoData { path: PathBuf },
}

/// Result type alias for loader operations.
pub type LoadResult<T> = Result<T, LoadError>;
