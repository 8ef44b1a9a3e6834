//! Synthetic point clouds and rotations with known ground truth.
//!
//! Used by the unit tests and handy for benchmarking registration on data
//! where the answer is known.

use nalgebra::{Matrix3, Matrix3xX, Rotation3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::point_cloud::PointCloud;

/// Corner offsets that make every pairwise distance of the cube distinct.
///
/// With side length 2 the 28 distances are at least 0.024 apart, so only the
/// true pairing is consistent at `epsilon = 0.015`.
const CUBE_JITTER: [[f64; 3]; 8] = [
    [0.13, -0.08, 0.04],
    [0.12, 0.05, 0.10],
    [-0.08, 0.16, 0.11],
    [0.05, -0.18, 0.02],
    [-0.06, -0.18, -0.18],
    [0.17, 0.03, -0.19],
    [0.19, 0.14, -0.05],
    [0.20, 0.08, -0.15],
];

/// Rotation matrix `Rz(yaw) * Ry(pitch) * Rx(roll)`.
pub fn make_euler(roll: f64, pitch: f64, yaw: f64) -> Matrix3<f64> {
    Rotation3::from_euler_angles(roll, pitch, yaw).into_inner()
}

/// The 8 corners of a side-2 cube, each nudged so the shape has no symmetry.
pub fn make_irregular_cube() -> PointCloud {
    let mut points = Vec::with_capacity(8);
    for (i, jitter) in CUBE_JITTER.iter().enumerate() {
        let corner = [(i >> 2) & 1, (i >> 1) & 1, i & 1];
        points.push([
            2.0 * (corner[0] as f64 + jitter[0]),
            2.0 * (corner[1] as f64 + jitter[1]),
            2.0 * (corner[2] as f64 + jitter[2]),
        ]);
    }
    PointCloud::from_points(&points)
}

/// `n` points uniformly distributed in `[-half_extent, half_extent]³`.
pub fn random_cloud(rng: &mut StdRng, n: usize, half_extent: f64) -> PointCloud {
    PointCloud::new(Matrix3xX::from_fn(n, |_, _| {
        rng.gen_range(-half_extent..=half_extent)
    }))
}

/// Copy of `cloud` with zero-mean Gaussian noise on every coordinate.
pub fn add_gaussian_noise(cloud: &PointCloud, sigma: f64, rng: &mut StdRng) -> PointCloud {
    let Ok(normal) = Normal::new(0.0, sigma) else {
        return cloud.clone();
    };
    PointCloud::new(cloud.as_matrix().map(|v| v + normal.sample(rng)))
}

/// Append `count` uniform outliers in `[-half_extent, half_extent]³`.
pub fn add_outliers(
    cloud: &PointCloud,
    count: usize,
    half_extent: f64,
    rng: &mut StdRng,
) -> PointCloud {
    let extra = random_cloud(rng, count, half_extent);
    let mut points = cloud.to_points();
    points.extend(extra.to_points());
    PointCloud::from_points(&points)
}

/// Shuffle the columns of `cloud`.
///
/// # Returns
/// The shuffled cloud and `origin`, where column `j` of the result is
/// column `origin[j]` of the input.
pub fn shuffle_columns(cloud: &PointCloud, rng: &mut StdRng) -> (PointCloud, Vec<usize>) {
    let mut origin: Vec<usize> = (0..cloud.len()).collect();
    origin.shuffle(rng);
    (cloud.select(&origin), origin)
}
