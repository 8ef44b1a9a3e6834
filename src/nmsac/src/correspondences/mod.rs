//! Correspondence search between two small point sets.
//!
//! Two interchangeable solvers are available:
//!
//! - [`mc`]: maximum clique of the pairwise consistency graph
//! - [`qap`]: relaxed quadratic assignment with an LP projection
//!
//! Both return a [`Correspondences`] map from `(source index, target index)`
//! to a strength in `[0, 1]`. [`CorrespondenceSolver`] selects one from
//! configuration.

pub mod clique;
pub mod consistency;
pub mod graph;
pub mod mc;
pub mod qap;

use std::collections::BTreeMap;

pub use clique::{find_max_clique, greedy_coloring, next_available_color, MaxCliqueAlgorithm};
pub use consistency::{consistency, WeightKey, WeightTensor};
pub use graph::UndirectedGraph;
pub use mc::{McConfig, MaxCliqueSolver};
pub use qap::{QapConfig, QapSolver};

use crate::error::SolverFailure;
use crate::point_cloud::PointCloud;

/// Matched index pairs ordered by source then target index, with strength.
pub type Correspondences = BTreeMap<(usize, usize), f64>;

/// Correspondence algorithm together with its settings.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrespondenceConfig {
    Qap(QapConfig),
    Mc(McConfig),
}

impl Default for CorrespondenceConfig {
    fn default() -> Self {
        CorrespondenceConfig::Qap(QapConfig::default())
    }
}

impl CorrespondenceConfig {
    /// Short algorithm name, `"qap"` or `"mc"`.
    pub fn name(&self) -> &'static str {
        match self {
            CorrespondenceConfig::Qap(_) => "qap",
            CorrespondenceConfig::Mc(_) => "mc",
        }
    }

    /// Consistency bound, also used as the inlier distance.
    pub fn epsilon(&self) -> f64 {
        match self {
            CorrespondenceConfig::Qap(c) => c.epsilon,
            CorrespondenceConfig::Mc(c) => c.epsilon,
        }
    }

    pub fn pairwise_dist_threshold(&self) -> f64 {
        match self {
            CorrespondenceConfig::Qap(c) => c.pairwise_dist_threshold,
            CorrespondenceConfig::Mc(c) => c.pairwise_dist_threshold,
        }
    }
}

/// A configured correspondence solver.
#[derive(Debug, Clone)]
pub enum CorrespondenceSolver {
    Qap(QapSolver),
    Mc(MaxCliqueSolver),
}

impl CorrespondenceSolver {
    pub fn new(config: &CorrespondenceConfig) -> Self {
        match config {
            CorrespondenceConfig::Qap(c) => CorrespondenceSolver::Qap(QapSolver::new(c.clone())),
            CorrespondenceConfig::Mc(c) => CorrespondenceSolver::Mc(MaxCliqueSolver::new(c.clone())),
        }
    }

    /// Find correspondences from `source` to `target`.
    pub fn solve(
        &self,
        source: &PointCloud,
        target: &PointCloud,
    ) -> Result<Correspondences, SolverFailure> {
        match self {
            CorrespondenceSolver::Qap(solver) => solver.solve(source, target),
            CorrespondenceSolver::Mc(solver) => solver.solve(source, target),
        }
    }
}

impl From<&CorrespondenceConfig> for CorrespondenceSolver {
    fn from(config: &CorrespondenceConfig) -> Self {
        Self::new(config)
    }
}
