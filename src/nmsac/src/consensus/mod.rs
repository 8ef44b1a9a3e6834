//! Non-minimal sample consensus over two point clouds.
//!
//! Each trial draws `points_per_sample` points from a source working copy
//! and from a target working copy, matches them with the configured
//! correspondence solver, fits a coarse rigid transform to the matches and
//! refines it with ICP against the full clouds. The transform that brings
//! the most source points within `epsilon` of the target wins.
//!
//! # Sampling
//!
//! The source working copy shrinks across the whole run: every outer draw
//! removes its points for good. For each source draw the target working copy
//! is reset to the full target and sampled at least once, then again while
//! at least `2 * points_per_sample` target points remain.
//!
//! # Stopping
//!
//! After every improvement the adaptive bound
//!
//! ```text
//! T_max = log(1 - ps) / log(1 - (inliers / N)^k)
//! ```
//!
//! is recomputed and truncated to whole trials. The run ends once the number
//! of completed trials reaches `max(T_max, min_iter)`, once `max_iter` trials
//! completed, or once the source working copy can no longer supply a full
//! sample.

pub mod debug;

pub use debug::{RegistrationDebug, TrialDebug, TrialOutcome};

use nalgebra::{DMatrix, Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::NmsacConfig;
use crate::correspondences::CorrespondenceSolver;
use crate::point_cloud::PointCloud;
use crate::search::NearestNeighborSearch;
use crate::transforms::{best_fit_transform, IcpRefiner, RigidTransform};

/// Outcome of a registration call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationResult {
    /// True iff at least one trial completed.
    pub success: bool,

    /// Rotation of the best transform (identity on failure).
    pub rotation: Matrix3<f64>,

    /// Translation of the best transform (zero on failure).
    pub translation: Vector3<f64>,

    /// Source points within `epsilon` of the target under the best transform.
    pub inliers: usize,

    /// Number of completed trials.
    pub iterations: usize,
}

impl RegistrationResult {
    fn failed() -> Self {
        Self {
            success: false,
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
            inliers: 0,
            iterations: 0,
        }
    }

    /// The best transform.
    pub fn transform(&self) -> RigidTransform {
        RigidTransform::new(self.rotation, self.translation)
    }
}

/// Number of points of `cloud` whose nearest neighbor in `search` lies
/// within `epsilon`.
pub fn count_inliers(cloud: &PointCloud, search: &NearestNeighborSearch, epsilon: f64) -> usize {
    search.count_within(cloud, epsilon)
}

/// Adaptive number of trials needed to draw an all-inlier sample with
/// probability `ps`, given the best inlier count so far.
///
/// Returns `0` when every point is an inlier and infinity when none is.
pub fn adaptive_trial_bound(inliers: usize, total: usize, ps: f64, k: usize) -> f64 {
    if total == 0 || inliers == 0 {
        return f64::INFINITY;
    }
    let ratio = (inliers as f64 / total as f64).min(1.0);
    let exponent = i32::try_from(k).unwrap_or(i32::MAX);
    let bound = (1.0 - ps).ln() / (1.0 - ratio.powi(exponent)).ln();
    if bound.is_nan() {
        f64::INFINITY
    } else {
        bound.max(0.0)
    }
}

/// Completed trials after which the adaptive bound ends the run.
///
/// The bound is truncated to whole trials; an infinite bound never stops.
fn stop_threshold(trial_bound: f64, min_iter: usize) -> usize {
    let bound = if trial_bound.is_finite() {
        trial_bound.trunc() as usize
    } else {
        usize::MAX
    };
    bound.max(min_iter)
}

/// Register column-major `3 x N` matrices.
///
/// Input that is not 3-dimensional or contains non-finite values yields a
/// failed result without running any trial.
pub fn register(
    source: &DMatrix<f64>,
    target: &DMatrix<f64>,
    config: &NmsacConfig,
) -> RegistrationResult {
    let clouds = PointCloud::from_matrix(source)
        .and_then(|s| PointCloud::from_matrix(target).map(|t| (s, t)));
    match clouds {
        Ok((source, target)) => register_clouds(&source, &target, config),
        Err(e) => {
            warn!("registration input rejected: {e}");
            RegistrationResult::failed()
        }
    }
}

/// Register `source` onto `target`.
pub fn register_clouds(
    source: &PointCloud,
    target: &PointCloud,
    config: &NmsacConfig,
) -> RegistrationResult {
    Consensus::new(source, target, config).run(None)
}

/// Like [`register_clouds`], also recording every trial.
pub fn register_with_debug(
    source: &PointCloud,
    target: &PointCloud,
    config: &NmsacConfig,
) -> (RegistrationResult, RegistrationDebug) {
    let mut record = RegistrationDebug {
        algorithm: config.algorithm.name().to_string(),
        num_source_points: source.len(),
        num_target_points: target.len(),
        ..Default::default()
    };
    let result = Consensus::new(source, target, config).run(Some(&mut record));
    (result, record)
}

/// Register independent cloud pairs in parallel.
///
/// Every pair runs with its own RNG seeded from `config.random_seed`, so
/// each result equals the one [`register_clouds`] returns for that pair.
pub fn register_batch(
    pairs: &[(PointCloud, PointCloud)],
    config: &NmsacConfig,
) -> Vec<RegistrationResult> {
    pairs
        .par_iter()
        .map(|(source, target)| register_clouds(source, target, config))
        .collect()
}

/// Best transform found so far.
struct Best {
    transform: RigidTransform,
    inliers: usize,
}

/// State of one consensus run.
struct Consensus<'a> {
    source: &'a PointCloud,
    target: &'a PointCloud,
    config: &'a NmsacConfig,
    solver: CorrespondenceSolver,
    refiner: IcpRefiner,
    epsilon: f64,
}

/// Result of a completed trial.
struct TrialFit {
    transform: RigidTransform,
    correspondences: usize,
    icp_iterations: usize,
    icp_mean_error: f64,
    inliers: usize,
}

impl<'a> Consensus<'a> {
    fn new(source: &'a PointCloud, target: &'a PointCloud, config: &'a NmsacConfig) -> Self {
        Self {
            source,
            target,
            config,
            solver: CorrespondenceSolver::new(&config.algorithm),
            refiner: IcpRefiner::new(config.icp.clone()),
            epsilon: config.algorithm.epsilon(),
        }
    }

    fn run(&self, mut record: Option<&mut RegistrationDebug>) -> RegistrationResult {
        let config = self.config;
        if let Err(e) = config.validate() {
            warn!("registration config rejected: {e}");
            return RegistrationResult::failed();
        }
        if self.source.is_empty() {
            warn!("source point cloud is empty");
            return RegistrationResult::failed();
        }
        let Some(search) = NearestNeighborSearch::from_cloud(self.target) else {
            warn!("target point cloud is empty");
            return RegistrationResult::failed();
        };

        let per_sample = config.points_per_sample;
        let mut rng = StdRng::seed_from_u64(config.random_seed);
        let mut source_pool = self.source.clone();
        let mut best: Option<Best> = None;
        let mut trial_bound = f64::INFINITY;
        let mut iterations = 0;
        let mut source_draw = 0;

        let stop_reason = 'outer: loop {
            if iterations >= config.max_iter {
                break "max_iter reached";
            }
            if source_pool.is_empty() || (source_draw > 0 && source_pool.len() < per_sample) {
                break "source exhausted";
            }
            let source_sample = source_pool.sample_columns(per_sample, &mut rng);
            let mut target_pool = self.target.clone();

            loop {
                let target_sample = target_pool.sample_columns(per_sample, &mut rng);
                if config.print_status {
                    info!(remaining = target_pool.len(), "sampled target points");
                }

                let mut trial = TrialDebug {
                    source_draw,
                    source_remaining: source_pool.len(),
                    target_remaining: target_pool.len(),
                    outcome: TrialOutcome::NoCorrespondences {
                        reason: String::new(),
                    },
                    transform: None,
                    trial_bound: None,
                };

                match self.trial(&source_sample, &target_sample, &search) {
                    Ok(fit) => {
                        iterations += 1;
                        let improved = best.as_ref().map_or(fit.inliers > 0, |b| fit.inliers > b.inliers);
                        debug!(
                            iterations,
                            inliers = fit.inliers,
                            correspondences = fit.correspondences,
                            icp_iterations = fit.icp_iterations,
                            "trial completed"
                        );
                        if improved || best.is_none() {
                            best = Some(Best {
                                transform: fit.transform,
                                inliers: fit.inliers,
                            });
                        }
                        if improved {
                            trial_bound = adaptive_trial_bound(
                                fit.inliers,
                                self.source.len(),
                                config.ps,
                                config.k,
                            );
                            if config.print_status {
                                info!(inliers = fit.inliers, trial_bound, "best consensus so far");
                            } else {
                                debug!(inliers = fit.inliers, trial_bound, "best consensus so far");
                            }
                        }

                        trial.set_transform(&fit.transform);
                        trial.outcome = TrialOutcome::Completed {
                            correspondences: fit.correspondences,
                            icp_iterations: fit.icp_iterations,
                            icp_mean_error: fit.icp_mean_error,
                            inliers: fit.inliers,
                            improved,
                        };
                        trial.trial_bound = trial_bound.is_finite().then_some(trial_bound);
                        if let Some(record) = record.as_deref_mut() {
                            record.trials.push(trial);
                        }

                        if iterations >= stop_threshold(trial_bound, config.min_iter) {
                            break 'outer "converged";
                        }
                        if iterations >= config.max_iter {
                            break 'outer "max_iter reached";
                        }
                    }
                    Err(outcome) => {
                        trial.outcome = outcome;
                        if let Some(record) = record.as_deref_mut() {
                            record.trials.push(trial);
                        }
                    }
                }

                if target_pool.len() < 2 * per_sample {
                    break;
                }
            }
            source_draw += 1;
        };

        if let Some(record) = record {
            record.stop_reason = stop_reason.to_string();
        }

        match best {
            Some(best) => {
                if config.print_status {
                    info!(iterations, inliers = best.inliers, stop_reason, "registration finished");
                } else {
                    debug!(iterations, inliers = best.inliers, stop_reason, "registration finished");
                }
                RegistrationResult {
                    success: true,
                    rotation: best.transform.rotation,
                    translation: best.transform.translation,
                    inliers: best.inliers,
                    iterations,
                }
            }
            None => {
                debug!(stop_reason, "registration found no consensus");
                RegistrationResult::failed()
            }
        }
    }

    /// Match, fit and refine one sample pair.
    fn trial(
        &self,
        source_sample: &PointCloud,
        target_sample: &PointCloud,
        search: &NearestNeighborSearch,
    ) -> Result<TrialFit, TrialOutcome> {
        let correspondences = self
            .solver
            .solve(source_sample, target_sample)
            .map_err(|e| {
                trace!("sample skipped: {e}");
                TrialOutcome::NoCorrespondences {
                    reason: e.to_string(),
                }
            })?;

        let coarse = best_fit_transform(source_sample, target_sample, Some(&correspondences))
            .map_err(|e| {
                trace!("coarse fit rejected: {e}");
                TrialOutcome::FitFailed {
                    reason: e.to_string(),
                }
            })?;

        let refined = self
            .refiner
            .refine(self.source, self.target, search, &coarse)
            .map_err(|e| {
                warn!("ICP failed: {e}");
                TrialOutcome::IcpFailed {
                    reason: e.to_string(),
                }
            })?;
        if !refined.status.is_converged() {
            trace!(iterations = refined.iterations, "ICP did not converge");
            return Err(TrialOutcome::IcpFailed {
                reason: format!("no convergence after {} iterations", refined.iterations),
            });
        }

        let moved = refined.transform.apply(self.source);
        Ok(TrialFit {
            transform: refined.transform,
            correspondences: correspondences.len(),
            icp_iterations: refined.iterations,
            icp_mean_error: refined.mean_error,
            inliers: count_inliers(&moved, search, self.epsilon),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondences::{CorrespondenceConfig, McConfig, QapConfig};
    use crate::test_utils::{
        add_outliers, make_euler, make_irregular_cube, random_cloud, shuffle_columns,
    };
    use approx::assert_relative_eq;

    fn truth() -> RigidTransform {
        RigidTransform::new(make_euler(0.4, -0.3, 1.1), Vector3::new(1.5, -0.5, 0.75))
    }

    fn cube_config(algorithm: CorrespondenceConfig) -> NmsacConfig {
        NmsacConfig {
            points_per_sample: 8,
            algorithm,
            ..Default::default()
        }
    }

    fn cube_mc() -> CorrespondenceConfig {
        CorrespondenceConfig::Mc(McConfig {
            epsilon: 0.015,
            pairwise_dist_threshold: 1e-2,
            ..Default::default()
        })
    }

    fn cube_qap() -> CorrespondenceConfig {
        CorrespondenceConfig::Qap(QapConfig {
            epsilon: 0.015,
            pairwise_dist_threshold: 1e-2,
            corr_threshold: 0.9,
            n_pair_threshold: 5,
            min_corr: 4,
            ..Default::default()
        })
    }

    fn shuffled_target(cloud: &PointCloud, seed: u64) -> PointCloud {
        let mut rng = StdRng::seed_from_u64(seed);
        shuffle_columns(&truth().apply(cloud), &mut rng).0
    }

    fn assert_recovers_truth(result: &RegistrationResult) {
        let expected = truth();
        assert!(result.success);
        assert_relative_eq!(result.rotation, expected.rotation, epsilon = 1e-7);
        assert_relative_eq!(result.translation, expected.translation, epsilon = 1e-7);
    }

    #[test]
    fn test_cube_with_max_clique() {
        let cube = make_irregular_cube();
        let target = shuffled_target(&cube, 3);
        let result = register_clouds(&cube, &target, &cube_config(cube_mc()));

        assert_recovers_truth(&result);
        assert_eq!(result.inliers, 8);
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn test_cube_with_qap() {
        let cube = make_irregular_cube();
        let target = shuffled_target(&cube, 3);
        let result = register_clouds(&cube, &target, &cube_config(cube_qap()));

        assert_recovers_truth(&result);
        assert_eq!(result.inliers, 8);
    }

    #[test]
    fn test_matrix_entry_point() {
        let cube = make_irregular_cube();
        let target = shuffled_target(&cube, 5);
        let source = DMatrix::from_column_slice(3, 8, cube.as_matrix().as_slice());
        let target = DMatrix::from_column_slice(3, 8, target.as_matrix().as_slice());

        let result = register(&source, &target, &cube_config(cube_mc()));
        assert_recovers_truth(&result);
    }

    #[test]
    fn test_non_3d_input_fails_fast() {
        let config = NmsacConfig::default();
        let flat = DMatrix::<f64>::zeros(2, 10);
        let good = DMatrix::<f64>::zeros(3, 10);

        for (s, t) in [(&flat, &good), (&good, &flat)] {
            let result = register(s, t, &config);
            assert!(!result.success);
            assert_eq!(result.iterations, 0);
            assert_eq!(result.rotation, Matrix3::identity());
        }
    }

    #[test]
    fn test_empty_clouds_fail() {
        let cube = make_irregular_cube();
        let config = cube_config(cube_mc());
        assert!(!register_clouds(&PointCloud::empty(), &cube, &config).success);
        assert!(!register_clouds(&cube, &PointCloud::empty(), &config).success);
    }

    #[test]
    fn test_target_outliers_are_ignored() {
        let cube = make_irregular_cube();
        let mut points = truth().apply(&cube).to_points();
        points.extend([
            [30.0, 0.0, 0.0],
            [0.0, 30.0, 0.0],
            [0.0, 0.0, 30.0],
            [-30.0, -30.0, -30.0],
        ]);
        let mut rng = StdRng::seed_from_u64(17);
        let (target, _) = shuffle_columns(&PointCloud::from_points(&points), &mut rng);

        let (result, record) = register_with_debug(&cube, &target, &cube_config(cube_mc()));
        assert_recovers_truth(&result);
        assert_eq!(result.inliers, 8);
        assert_eq!(record.trials.len(), 1);
        assert_eq!(record.completed_trials(), 1);
        assert_eq!(record.trials[0].target_remaining, 4);
        assert_eq!(record.stop_reason, "source exhausted");
    }

    #[test]
    fn test_adaptive_bound_stops_early() {
        let mut rng = StdRng::seed_from_u64(42);
        let source = random_cloud(&mut rng, 30, 2.0);
        let (target, _) = shuffle_columns(&truth().apply(&source), &mut rng);
        let config = NmsacConfig {
            points_per_sample: 10,
            min_iter: 1,
            algorithm: CorrespondenceConfig::Mc(McConfig {
                epsilon: 1e-6,
                pairwise_dist_threshold: 1e-2,
                ..Default::default()
            }),
            ..Default::default()
        };

        let (result, record) = register_with_debug(&source, &target, &config);
        assert_recovers_truth(&result);
        assert_eq!(result.inliers, 30);
        assert_eq!(record.stop_reason, "converged");
        // Full consensus sets the bound to zero, so the first perfect trial ends the run.
        let last = record.trials.last().unwrap();
        assert!(matches!(
            last.outcome,
            TrialOutcome::Completed { inliers: 30, improved: true, .. }
        ));
        assert_eq!(last.trial_bound, Some(0.0));
    }

    #[test]
    fn test_failed_samples_are_skipped() {
        let mut rng = StdRng::seed_from_u64(23);
        let source = random_cloud(&mut rng, 40, 2.0);
        let with_outliers = add_outliers(&truth().apply(&source), 10, 500.0, &mut rng);
        let (target, _) = shuffle_columns(&with_outliers, &mut rng);
        let config = NmsacConfig {
            points_per_sample: 10,
            min_iter: 1000,
            algorithm: CorrespondenceConfig::Mc(McConfig {
                epsilon: 1e-6,
                pairwise_dist_threshold: 1e-2,
                ..Default::default()
            }),
            ..Default::default()
        };

        let (result, record) = register_with_debug(&source, &target, &config);
        assert_recovers_truth(&result);
        assert_eq!(result.inliers, 40);

        // 4 source draws of 10 points, each matched against 4 target draws.
        assert_eq!(record.trials.len(), 16);
        assert_eq!(record.stop_reason, "source exhausted");
        assert_eq!(record.completed_trials(), result.iterations);

        let first_skipped = record
            .trials
            .iter()
            .position(|t| matches!(t.outcome, TrialOutcome::NoCorrespondences { .. }))
            .unwrap();
        assert!(first_skipped + 1 < record.trials.len());
        assert!(record.trials[first_skipped].transform.is_none());
    }

    #[test]
    fn test_repeated_target_point() {
        let cube = make_irregular_cube();
        let target = PointCloud::from_points(&vec![[0.5, 0.5, 0.5]; 300]);
        let (result, record) = register_with_debug(&cube, &target, &cube_config(cube_mc()));

        assert!(!result.success);
        assert_eq!(result.iterations, 0);
        assert!(!record.trials.is_empty());
        assert_eq!(record.completed_trials(), 0);
    }

    #[test]
    fn test_collinear_target() {
        let cube = make_irregular_cube();
        let points: Vec<[f64; 3]> = (0..1000).map(|i| [1.0, -1.0, i as f64 * 0.01]).collect();
        let target = PointCloud::from_points(&points);
        let result = register_clouds(&cube, &target, &cube_config(cube_mc()));

        assert_eq!(result.success, result.iterations > 0);
        assert!(result.inliers <= 8);
    }

    #[test]
    fn test_stop_threshold_truncates_bound() {
        assert_eq!(stop_threshold(2.7, 1), 2);
        assert_eq!(stop_threshold(2.7, 5), 5);
        assert_eq!(stop_threshold(0.0, 1), 1);
        assert_eq!(stop_threshold(f64::INFINITY, 5), usize::MAX);
    }

    #[test]
    fn test_max_iter_caps_trials() {
        let mut rng = StdRng::seed_from_u64(8);
        let source = random_cloud(&mut rng, 30, 2.0);
        let (target, _) = shuffle_columns(&truth().apply(&source), &mut rng);
        let config = NmsacConfig {
            points_per_sample: 10,
            max_iter: 1,
            algorithm: CorrespondenceConfig::Mc(McConfig {
                epsilon: 1e-6,
                pairwise_dist_threshold: 1e-2,
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = register_clouds(&source, &target, &config);
        assert!(result.iterations <= 1);
    }

    #[test]
    fn test_same_seed_same_result() {
        let mut rng = StdRng::seed_from_u64(77);
        let source = random_cloud(&mut rng, 24, 1.0);
        let (target, _) = shuffle_columns(&truth().apply(&source), &mut rng);
        let config = NmsacConfig {
            points_per_sample: 8,
            random_seed: 5,
            algorithm: cube_mc(),
            ..Default::default()
        };

        let first = register_clouds(&source, &target, &config);
        let second = register_clouds(&source, &target, &config);
        assert_eq!(first, second);

        let batch = register_batch(
            &[(source.clone(), target.clone()), (source.clone(), target.clone())],
            &config,
        );
        assert_eq!(batch, vec![first.clone(), first]);
    }

    #[test]
    fn test_adaptive_trial_bound() {
        assert_eq!(adaptive_trial_bound(8, 8, 0.99, 4), 0.0);
        assert_eq!(adaptive_trial_bound(0, 8, 0.99, 4), f64::INFINITY);
        assert_relative_eq!(
            adaptive_trial_bound(4, 8, 0.99, 4),
            (0.01f64).ln() / (1.0 - 1.0 / 16.0f64).ln(),
            epsilon = 1e-12
        );
        assert!(adaptive_trial_bound(9, 10, 0.99, 4) < adaptive_trial_bound(5, 10, 0.99, 4));
    }

    #[test]
    fn test_count_inliers() {
        let cube = make_irregular_cube();
        let search = NearestNeighborSearch::from_cloud(&cube).unwrap();
        assert_eq!(count_inliers(&cube, &search, 1e-9), 8);
        let shifted = RigidTransform::new(Matrix3::identity(), Vector3::new(10.0, 0.0, 0.0));
        assert_eq!(count_inliers(&shifted.apply(&cube), &search, 0.5), 0);
    }
}
