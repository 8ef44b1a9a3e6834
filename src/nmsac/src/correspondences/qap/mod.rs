//! Correspondences from a relaxed quadratic assignment problem.
//!
//! # Pipeline
//!
//! 1. Build the sparse [`WeightTensor`] of consistent pairs.
//! 2. Minimize the relaxed objective with [`AugmentedLagrangian`].
//! 3. Project the continuous optimum onto an integral assignment with the
//!    transportation LP in [`transport`].
//! 4. Keep the non-slack entries at or above `corr_threshold`, using the
//!    entry value as the correspondence strength.

pub mod nlp;
pub mod objective;
pub mod transport;

pub use nlp::{AugmentedLagrangian, NlpConfig, NlpResult, NlpStatus};
pub use objective::RelaxedAssignment;
pub use transport::{project_assignment, TransportationProblem};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::consistency::WeightTensor;
use super::Correspondences;
use crate::error::SolverFailure;
use crate::point_cloud::PointCloud;

/// Parameters for the QAP correspondence solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QapConfig {
    /// Maximum consistency error for a pairwise weight to be non-zero.
    pub epsilon: f64,

    /// Minimum distance between the two points of a pair on either side.
    pub pairwise_dist_threshold: f64,

    /// Minimum assignment value for an entry to become a correspondence.
    pub corr_threshold: f64,

    /// Minimum number of non-zero weights required to attempt a solve.
    #[serde(deserialize_with = "crate::config::count")]
    pub n_pair_threshold: usize,

    /// Number of correspondences the assignment must contain.
    #[serde(deserialize_with = "crate::config::count")]
    pub min_corr: usize,

    /// Nonlinear solver settings.
    #[serde(skip_deserializing)]
    pub nlp: NlpConfig,
}

impl Default for QapConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            pairwise_dist_threshold: 0.1,
            corr_threshold: 0.9,
            n_pair_threshold: 0,
            min_corr: 5,
            nlp: NlpConfig::default(),
        }
    }
}

/// Detailed outcome of a QAP solve.
#[derive(Debug, Clone)]
pub struct QapSolution {
    pub correspondences: Correspondences,
    /// Assignment the correspondences were read from.
    pub assignment: DVector<f64>,
    /// Whether the LP projection succeeded and replaced the NLP optimum.
    pub projected: bool,
    pub nlp: NlpResult,
}

/// QAP correspondence solver.
#[derive(Debug, Clone, Default)]
pub struct QapSolver {
    config: QapConfig,
}

impl QapSolver {
    pub fn new(config: QapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QapConfig {
        &self.config
    }

    /// Match `source` against `target`.
    pub fn solve(
        &self,
        source: &PointCloud,
        target: &PointCloud,
    ) -> Result<Correspondences, SolverFailure> {
        self.solve_detailed(source, target)
            .map(|solution| solution.correspondences)
    }

    /// Like [`QapSolver::solve`], also returning solver internals.
    ///
    /// # Errors
    /// - [`SolverFailure::Infeasible`] if `min_corr` exceeds either cloud
    /// - [`SolverFailure::NoConsistentPairs`] if no weight is non-zero
    /// - [`SolverFailure::TooFewPairs`] below `n_pair_threshold` weights
    /// - [`SolverFailure::NotConverged`] if the NLP does not succeed
    /// - [`SolverFailure::BelowThreshold`] if no entry reaches `corr_threshold`
    pub fn solve_detailed(
        &self,
        source: &PointCloud,
        target: &PointCloud,
    ) -> Result<QapSolution, SolverFailure> {
        let cfg = &self.config;
        let (m, n) = (source.len(), target.len());
        if cfg.min_corr > m.min(n) {
            return Err(SolverFailure::Infeasible {
                min_corr: cfg.min_corr,
                source_len: m,
                target_len: n,
            });
        }

        let weights =
            WeightTensor::generate(source, target, cfg.epsilon, cfg.pairwise_dist_threshold);
        if weights.is_empty() {
            return Err(SolverFailure::NoConsistentPairs);
        }
        if weights.len() < cfg.n_pair_threshold {
            return Err(SolverFailure::TooFewPairs {
                found: weights.len(),
                required: cfg.n_pair_threshold,
            });
        }

        let problem = RelaxedAssignment::new(m, n, cfg.min_corr, &weights);
        let nlp = AugmentedLagrangian::new(cfg.nlp.clone()).solve(&problem);
        if !nlp.status.is_success() {
            return Err(SolverFailure::NotConverged(nlp.status));
        }

        let (assignment, projected) = match project_assignment(&problem, &nlp.solution) {
            Some(x) => (x, true),
            None => {
                debug!("assignment projection failed, using relaxed optimum");
                (nlp.solution.clone(), false)
            }
        };

        let mut correspondences = Correspondences::new();
        for i in 0..m {
            for j in 0..n {
                let value = assignment[problem.index(i, j)];
                if value >= cfg.corr_threshold {
                    correspondences.insert((i, j), value);
                }
            }
        }
        trace!(
            weights = weights.len(),
            correspondences = correspondences.len(),
            projected,
            "QAP solved"
        );
        if correspondences.is_empty() {
            return Err(SolverFailure::BelowThreshold);
        }

        Ok(QapSolution {
            correspondences,
            assignment,
            projected,
            nlp,
        })
    }
}
