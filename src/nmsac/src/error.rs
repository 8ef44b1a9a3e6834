//! Error types shared across the registration pipeline.
//!
//! Expected numerical outcomes (a solver that does not converge, a sample
//! without consistent pairs) are reported through status enums and
//! [`SolverFailure`]; the errors here cover invalid input.

use thiserror::Error;

/// Errors raised when building a point cloud from raw data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PointCloudError {
    #[error("point matrix must have 3 rows, got {0}")]
    InvalidDimension(usize),

    #[error("point {index} has a non-finite coordinate")]
    NonFinite { index: usize },
}

/// Errors raised by the SVD rigid transform fitter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("identity pairing needs equal point counts (source {source_len}, target {target_len})")]
    CountMismatch {
        source_len: usize,
        target_len: usize,
    },

    #[error("correspondence ({source_index}, {target_index}) is out of range")]
    IndexOutOfRange {
        source_index: usize,
        target_index: usize,
    },

    #[error("at least one correspondence is required")]
    Empty,
}

/// Errors raised by ICP input validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IcpError {
    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),

    #[error("reject ratio must lie in (0, 1), got {0}")]
    InvalidRejectRatio(f64),

    #[error("{0} point cloud is empty")]
    EmptyCloud(&'static str),

    #[error("rejection keeps no matches for {0} points")]
    NothingKept(usize),

    #[error(transparent)]
    Fit(#[from] FitError),
}

/// Structural errors in a consistency graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("edge ({0}, {1}) references a vertex missing from the vertex set")]
    MissingVertex(usize, usize),

    #[error("self loop on vertex {0}")]
    SelfLoop(usize),
}

/// Errors raised while reading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why a correspondence solver produced no usable answer for a sample.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverFailure {
    #[error("no pairwise-consistent candidate pairs")]
    NoConsistentPairs,

    #[error("weight tensor holds {found} entries, {required} required")]
    TooFewPairs { found: usize, required: usize },

    #[error("cannot select {min_corr} correspondences from {source_len}x{target_len} points")]
    Infeasible {
        min_corr: usize,
        source_len: usize,
        target_len: usize,
    },

    #[error("nonlinear solve stopped with status {0:?}")]
    NotConverged(crate::correspondences::qap::NlpStatus),

    #[error("no entry of the relaxed assignment reached the correspondence threshold")]
    BelowThreshold,
}
