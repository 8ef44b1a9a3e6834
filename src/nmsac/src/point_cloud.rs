//! Column-major 3-D point clouds and random column sampling.
//!
//! A [`PointCloud`] stores its points as the columns of a `3xN` matrix, the
//! layout the rigid fitter and ICP operate on directly. Subsampling draws
//! columns without replacement from a working copy and shrinks it in place,
//! so repeated draws never return the same point twice.

use nalgebra::{DMatrix, Matrix3xX, Vector3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::PointCloudError;

/// An ordered set of 3-D points stored column-wise.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    points: Matrix3xX<f64>,
}

impl PointCloud {
    /// Wrap an existing `3xN` matrix.
    pub fn new(points: Matrix3xX<f64>) -> Self {
        Self { points }
    }

    /// Create an empty cloud.
    pub fn empty() -> Self {
        Self {
            points: Matrix3xX::zeros(0),
        }
    }

    /// Build a cloud from `[x, y, z]` triples, preserving order.
    pub fn from_points(points: &[[f64; 3]]) -> Self {
        Self {
            points: Matrix3xX::from_fn(points.len(), |r, c| points[c][r]),
        }
    }

    /// Build a cloud from a dynamically sized matrix.
    ///
    /// # Errors
    /// Returns [`PointCloudError::InvalidDimension`] unless the matrix has
    /// exactly 3 rows, and [`PointCloudError::NonFinite`] for NaN or
    /// infinite coordinates.
    pub fn from_matrix(matrix: &DMatrix<f64>) -> Result<Self, PointCloudError> {
        if matrix.nrows() != 3 {
            return Err(PointCloudError::InvalidDimension(matrix.nrows()));
        }
        if let Some(index) = matrix
            .column_iter()
            .position(|col| col.iter().any(|v| !v.is_finite()))
        {
            return Err(PointCloudError::NonFinite { index });
        }
        Ok(Self {
            points: Matrix3xX::from_fn(matrix.ncols(), |r, c| matrix[(r, c)]),
        })
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.points.ncols() == 0
    }

    /// Point at column `index`.
    pub fn point(&self, index: usize) -> Vector3<f64> {
        self.points.column(index).into_owned()
    }

    /// Underlying `3xN` matrix.
    pub fn as_matrix(&self) -> &Matrix3xX<f64> {
        &self.points
    }

    /// Points as `[x, y, z]` triples.
    pub fn to_points(&self) -> Vec<[f64; 3]> {
        self.points
            .column_iter()
            .map(|c| [c[0], c[1], c[2]])
            .collect()
    }

    /// Iterate over the points.
    pub fn iter(&self) -> impl Iterator<Item = Vector3<f64>> + '_ {
        self.points.column_iter().map(|c| c.into_owned())
    }

    /// Mean of all points (zero for an empty cloud).
    pub fn centroid(&self) -> Vector3<f64> {
        if self.is_empty() {
            return Vector3::zeros();
        }
        self.points.column_sum() / self.len() as f64
    }

    /// New cloud holding the given columns, in the given order.
    ///
    /// # Panics
    /// Panics if any index is out of range.
    pub fn select(&self, indices: &[usize]) -> PointCloud {
        Self {
            points: self.points.select_columns(indices),
        }
    }

    /// Randomly draw `count` points without replacement.
    ///
    /// The columns are shuffled with `rng`; the first `count` shuffled
    /// columns are returned in shuffled order and the remaining columns,
    /// also in shuffled order, replace the contents of `self`. A `count`
    /// larger than the cloud takes every point.
    pub fn sample_columns(&mut self, count: usize, rng: &mut StdRng) -> PointCloud {
        let mut ordering: Vec<usize> = (0..self.len()).collect();
        ordering.shuffle(rng);

        let count = count.min(ordering.len());
        let sampled = self.select(&ordering[..count]);
        *self = self.select(&ordering[count..]);
        sampled
    }
}

impl From<Matrix3xX<f64>> for PointCloud {
    fn from(points: Matrix3xX<f64>) -> Self {
        Self::new(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn numbered_cloud(n: usize) -> PointCloud {
        let points: Vec<[f64; 3]> = (0..n)
            .map(|i| [i as f64, 10.0 * i as f64, -(i as f64)])
            .collect();
        PointCloud::from_points(&points)
    }

    fn column_id(cloud: &PointCloud, index: usize) -> usize {
        cloud.point(index).x as usize
    }

    #[test]
    fn test_from_matrix_rejects_wrong_rows() {
        let m = DMatrix::<f64>::zeros(2, 5);
        assert_eq!(
            PointCloud::from_matrix(&m),
            Err(PointCloudError::InvalidDimension(2))
        );
    }

    #[test]
    fn test_from_matrix_rejects_nan() {
        let mut m = DMatrix::<f64>::zeros(3, 4);
        m[(1, 2)] = f64::NAN;
        assert_eq!(
            PointCloud::from_matrix(&m),
            Err(PointCloudError::NonFinite { index: 2 })
        );
    }

    #[test]
    fn test_from_points_layout() {
        let cloud = PointCloud::from_points(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.as_matrix()[(2, 1)], 6.0);
        assert_eq!(cloud.to_points(), vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(cloud.centroid(), Vector3::new(2.5, 3.5, 4.5));
    }

    #[test]
    fn test_sample_columns_seeded_order() {
        let mut cloud = numbered_cloud(6);
        let mut rng = StdRng::seed_from_u64(11011);
        let sample = cloud.sample_columns(4, &mut rng);

        // Seed 11011 permutes 0..6 into [2, 3, 0, 5, 4, 1].
        let drawn: Vec<usize> = (0..sample.len()).map(|i| column_id(&sample, i)).collect();
        let left: Vec<usize> = (0..cloud.len()).map(|i| column_id(&cloud, i)).collect();
        assert_eq!(drawn, vec![2, 3, 0, 5]);
        assert_eq!(left, vec![4, 1]);

        let mut all: Vec<usize> = drawn.iter().chain(left.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_sample_columns_repeatable() {
        let mut a = numbered_cloud(20);
        let mut b = numbered_cloud(20);
        let sa = a.sample_columns(7, &mut StdRng::seed_from_u64(3));
        let sb = b.sample_columns(7, &mut StdRng::seed_from_u64(3));
        assert_eq!(sa, sb);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sample_columns_clamps_count() {
        let mut cloud = numbered_cloud(3);
        let mut rng = StdRng::seed_from_u64(1);
        let sample = cloud.sample_columns(10, &mut rng);
        assert_eq!(sample.len(), 3);
        assert!(cloud.is_empty());
    }
}
