//! High-level registration API.
//!
//! [`Nmsac`] wraps a validated [`NmsacConfig`] and runs the consensus loop
//! on plain point lists:
//!
//! ```ignore
//! use nmsac::Nmsac;
//!
//! let nmsac = Nmsac::builder()
//!     .points_per_sample(10)
//!     .random_seed(7)
//!     .build()?;
//! let result = nmsac.register(&source_points, &target_points)?;
//! println!("inliers: {}", result.inliers);
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::config::NmsacConfig;
use crate::consensus::{self, RegistrationDebug, RegistrationResult};
use crate::correspondences::CorrespondenceConfig;
use crate::point_cloud::PointCloud;
use crate::transforms::IcpConfig;

/// Builder for [`Nmsac`].
#[derive(Debug, Clone)]
pub struct NmsacBuilder {
    config: NmsacConfig,
}

impl NmsacBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: NmsacConfig::default(),
        }
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    pub fn print_status(mut self, print_status: bool) -> Self {
        self.config.print_status = print_status;
        self
    }

    /// Set the desired probability of drawing one outlier-free sample.
    pub fn ps(mut self, ps: f64) -> Self {
        self.config.ps = ps;
        self
    }

    pub fn k(mut self, k: usize) -> Self {
        self.config.k = k;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter;
        self
    }

    pub fn min_iter(mut self, min_iter: usize) -> Self {
        self.config.min_iter = min_iter;
        self
    }

    pub fn points_per_sample(mut self, points: usize) -> Self {
        self.config.points_per_sample = points;
        self
    }

    /// Replace all ICP settings.
    pub fn icp(mut self, icp: IcpConfig) -> Self {
        self.config.icp = icp;
        self
    }

    pub fn max_iter_icp(mut self, max_iterations: usize) -> Self {
        self.config.icp.max_iterations = max_iterations;
        self
    }

    pub fn tol_icp(mut self, tolerance: f64) -> Self {
        self.config.icp.tolerance = tolerance;
        self
    }

    pub fn outlier_rej_icp(mut self, reject_ratio: f64) -> Self {
        self.config.icp.reject_ratio = reject_ratio;
        self
    }

    /// Select the correspondence solver.
    pub fn algorithm(mut self, algorithm: CorrespondenceConfig) -> Self {
        self.config.algorithm = algorithm;
        self
    }

    /// Validate the settings and build the registration object.
    pub fn build(self) -> Result<Nmsac> {
        Nmsac::with_config(self.config)
    }
}

impl Default for NmsacBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-set registration by non-minimal sample consensus.
#[derive(Debug, Clone)]
pub struct Nmsac {
    config: NmsacConfig,
}

impl Nmsac {
    /// Create a registration object with validated settings.
    pub fn with_config(config: NmsacConfig) -> Result<Self> {
        config.validate().context("invalid registration config")?;
        Ok(Self { config })
    }

    /// Load settings from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = NmsacConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        Ok(Self { config })
    }

    pub fn builder() -> NmsacBuilder {
        NmsacBuilder::new()
    }

    /// Get the current configuration.
    pub fn config(&self) -> &NmsacConfig {
        &self.config
    }

    /// Register `source` onto `target`.
    ///
    /// # Errors
    /// Fails if either point list is empty or holds non-finite coordinates.
    /// A run that completes no trial is not an error; check
    /// [`RegistrationResult::success`].
    pub fn register(&self, source: &[[f64; 3]], target: &[[f64; 3]]) -> Result<RegistrationResult> {
        let (source, target) = Self::clouds(source, target)?;
        Ok(consensus::register_clouds(&source, &target, &self.config))
    }

    /// Like [`Nmsac::register`], also returning per-trial records.
    pub fn register_with_debug(
        &self,
        source: &[[f64; 3]],
        target: &[[f64; 3]],
    ) -> Result<(RegistrationResult, RegistrationDebug)> {
        let (source, target) = Self::clouds(source, target)?;
        Ok(consensus::register_with_debug(&source, &target, &self.config))
    }

    /// Register independent pairs in parallel.
    pub fn register_batch(&self, pairs: &[(PointCloud, PointCloud)]) -> Vec<RegistrationResult> {
        consensus::register_batch(pairs, &self.config)
    }

    fn clouds(source: &[[f64; 3]], target: &[[f64; 3]]) -> Result<(PointCloud, PointCloud)> {
        if source.is_empty() {
            bail!("source point list is empty");
        }
        if target.is_empty() {
            bail!("target point list is empty");
        }
        for (name, points) in [("source", source), ("target", target)] {
            if let Some(index) = points.iter().position(|p| p.iter().any(|v| !v.is_finite())) {
                bail!("{name} point {index} has a non-finite coordinate");
            }
        }
        Ok((PointCloud::from_points(source), PointCloud::from_points(target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondences::McConfig;
    use crate::test_utils::{make_euler, make_irregular_cube};
    use crate::transforms::RigidTransform;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_builder_validates() {
        assert!(Nmsac::builder().ps(1.5).build().is_err());
        assert!(Nmsac::builder().points_per_sample(0).build().is_err());
        assert!(Nmsac::builder().outlier_rej_icp(0.0).build().is_err());

        let nmsac = Nmsac::builder()
            .random_seed(3)
            .max_iter(20)
            .tol_icp(1e-9)
            .build()
            .unwrap();
        assert_eq!(nmsac.config().random_seed, 3);
        assert_eq!(nmsac.config().max_iter, 20);
        assert_eq!(nmsac.config().icp.tolerance, 1e-9);
    }

    #[test]
    fn test_register_points() {
        let cube = make_irregular_cube();
        let truth = RigidTransform::new(make_euler(-0.2, 0.6, 0.3), Vector3::new(0.0, 2.0, -1.0));
        let source = cube.to_points();
        let mut target = truth.apply(&cube).to_points();
        target.reverse();

        let nmsac = Nmsac::builder()
            .points_per_sample(8)
            .algorithm(CorrespondenceConfig::Mc(McConfig {
                epsilon: 0.015,
                pairwise_dist_threshold: 1e-2,
                ..Default::default()
            }))
            .build()
            .unwrap();
        let result = nmsac.register(&source, &target).unwrap();
        assert!(result.success);
        assert_eq!(result.inliers, 8);
        assert_relative_eq!(result.rotation, truth.rotation, epsilon = 1e-7);
        assert_relative_eq!(result.translation, truth.translation, epsilon = 1e-7);
    }

    #[test]
    fn test_register_rejects_bad_points() {
        let nmsac = Nmsac::builder().build().unwrap();
        let good = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        assert!(nmsac.register(&[], &good).is_err());
        assert!(nmsac.register(&good, &[]).is_err());
        let err = nmsac
            .register(&good, &[[0.0, f64::NAN, 0.0]])
            .unwrap_err();
        assert!(err.to_string().contains("target point 0"));
    }

    #[test]
    fn test_from_missing_file() {
        let err = Nmsac::from_file("/nonexistent/nmsac.json").unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }
}
