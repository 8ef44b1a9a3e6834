//! Iterative closest point refinement with worst-match rejection.
//!
//! Starting from an initial transform, each iteration:
//! 1. Matches every transformed source point to its nearest target point.
//! 2. Sorts the matches by distance and keeps the best `1 - reject_ratio`.
//! 3. Stops if the mean kept distance changed by less than `tolerance`.
//! 4. Otherwise fits a rigid transform on the kept matches and applies it.
//!
//! The reported transform is fitted from the original source to the final
//! moved source, so it is the total motion rather than the last increment.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::svd::best_fit_transform;
use super::types::RigidTransform;
use crate::error::IcpError;
use crate::point_cloud::PointCloud;
use crate::search::NearestNeighborSearch;

/// ICP parameters.
///
/// Read from the top-level configuration keys `max_iter_icp`, `tol_icp`
/// and `outlier_rej_icp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    /// Maximum number of match-and-fit iterations.
    #[serde(
        rename(deserialize = "max_iter_icp"),
        deserialize_with = "crate::config::count"
    )]
    pub max_iterations: usize,

    /// Convergence threshold on the change of the mean match distance.
    #[serde(rename(deserialize = "tol_icp"))]
    pub tolerance: f64,

    /// Fraction of matches, worst first, discarded on every iteration.
    #[serde(rename(deserialize = "outlier_rej_icp"))]
    pub reject_ratio: f64,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
            reject_ratio: 0.2,
        }
    }
}

impl IcpConfig {
    /// Check tolerance and reject ratio.
    pub fn validate(&self) -> Result<(), IcpError> {
        if !(self.tolerance >= f64::EPSILON) {
            return Err(IcpError::InvalidTolerance(self.tolerance));
        }
        if !(self.reject_ratio >= f64::EPSILON && self.reject_ratio <= 1.0 - f64::EPSILON) {
            return Err(IcpError::InvalidRejectRatio(self.reject_ratio));
        }
        Ok(())
    }
}

/// Terminal state of an ICP run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IcpStatus {
    /// Mean match distance settled within tolerance.
    Converged,
    /// Iteration budget exhausted first.
    MaxIterations,
}

impl IcpStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, IcpStatus::Converged)
    }
}

/// Outcome of [`IcpRefiner::refine`].
#[derive(Debug, Clone, Serialize)]
pub struct IcpResult {
    /// Total transform from the original source to the refined position.
    pub transform: RigidTransform,

    pub status: IcpStatus,

    /// Iterations performed, including the one that detected convergence.
    pub iterations: usize,

    /// Mean distance of the kept matches in the last iteration.
    pub mean_error: f64,
}

/// ICP refiner with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct IcpRefiner {
    config: IcpConfig,
}

impl IcpRefiner {
    pub fn new(config: IcpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// Refine `initial` so that `source` lands on `target`.
    ///
    /// # Arguments
    /// * `source` - Points to move
    /// * `target` - Points to align to
    /// * `target_search` - Nearest-neighbor index built from `target`
    /// * `initial` - Starting transform
    ///
    /// # Errors
    /// Invalid configuration, empty clouds, or a reject ratio that keeps no
    /// matches. Non-convergence is not an error; see [`IcpResult::status`].
    pub fn refine(
        &self,
        source: &PointCloud,
        target: &PointCloud,
        target_search: &NearestNeighborSearch,
        initial: &RigidTransform,
    ) -> Result<IcpResult, IcpError> {
        self.config.validate()?;
        if source.is_empty() {
            return Err(IcpError::EmptyCloud("source"));
        }
        if target.is_empty() {
            return Err(IcpError::EmptyCloud("target"));
        }

        let keep = ((1.0 - self.config.reject_ratio) * source.len() as f64).round() as usize;
        if keep == 0 {
            return Err(IcpError::NothingKept(source.len()));
        }

        let mut moved = initial.apply(source);
        let mut error = 0.0;
        let mut mean_error = 0.0;
        let mut status = IcpStatus::MaxIterations;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;

            let neighbors = target_search.nearest_all(&moved);
            let mut order: Vec<usize> = (0..neighbors.len()).collect();
            order.sort_by(|&a, &b| neighbors[a].distance.total_cmp(&neighbors[b].distance));
            order.truncate(keep);

            mean_error =
                order.iter().map(|&i| neighbors[i].distance).sum::<f64>() / keep as f64;
            trace!(iterations, mean_error, "ICP iteration");

            if (error - mean_error).abs() < self.config.tolerance {
                status = IcpStatus::Converged;
                break;
            }
            error = mean_error;

            let matched: Vec<usize> = order.iter().map(|&i| neighbors[i].index).collect();
            let step = best_fit_transform(&moved.select(&order), &target.select(&matched), None)?;
            moved = step.apply(&moved);
        }

        let transform = best_fit_transform(source, &moved, None)?;
        Ok(IcpResult {
            transform,
            status,
            iterations,
            mean_error,
        })
    }
}

/// One-shot ICP that builds the target index itself.
pub fn iterative_closest_point(
    source: &PointCloud,
    target: &PointCloud,
    initial: &RigidTransform,
    config: &IcpConfig,
) -> Result<IcpResult, IcpError> {
    let search =
        NearestNeighborSearch::from_cloud(target).ok_or(IcpError::EmptyCloud("target"))?;
    IcpRefiner::new(config.clone()).refine(source, target, &search, initial)
}
