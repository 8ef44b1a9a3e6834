//! Pairwise geometric consistency between candidate correspondences.
//!
//! Rigid motions preserve distances, so two candidate pairs `(i, j)` and
//! `(k, l)` can both be correct only if `|s_i - s_k| ≈ |t_j - t_l|`. The
//! absolute difference of the two distances is the consistency error.
//! Both correspondence solvers start from the set of 4-tuples whose error
//! is within `epsilon`.

use std::collections::HashMap;

use nalgebra::{DMatrix, Vector3};
use rayon::prelude::*;

use crate::point_cloud::PointCloud;

/// Index tuple `(i, j, k, l)`: `i`, `k` in the source, `j`, `l` in the target.
pub type WeightKey = (usize, usize, usize, usize);

/// Consistency error of the pairs `(s_i, t_j)` and `(s_k, t_l)`.
pub fn consistency(
    si: &Vector3<f64>,
    tj: &Vector3<f64>,
    sk: &Vector3<f64>,
    tl: &Vector3<f64>,
) -> f64 {
    ((si - sk).norm() - (tj - tl).norm()).abs()
}

/// All inter-point distances of a cloud, `d[(a, b)] = |p_a - p_b|`.
pub fn pairwise_distances(cloud: &PointCloud) -> DMatrix<f64> {
    let n = cloud.len();
    let points = cloud.as_matrix();
    let values: Vec<f64> = (0..n * n)
        .into_par_iter()
        .map(|idx| (points.column(idx % n) - points.column(idx / n)).norm())
        .collect();
    DMatrix::from_vec(n, n, values)
}

/// Every consistent 4-tuple with its consistency error.
///
/// A tuple qualifies when `i != k`, `j != l`, the error is at most
/// `epsilon`, and both `|s_i - s_k|` and `|t_j - t_l|` reach
/// `pairwise_dist_threshold`. Tuples come out in lexicographic order.
pub fn consistent_tuples(
    source: &PointCloud,
    target: &PointCloud,
    epsilon: f64,
    pairwise_dist_threshold: f64,
) -> Vec<(WeightKey, f64)> {
    let m = source.len();
    let n = target.len();
    let ds = pairwise_distances(source);
    let dt = pairwise_distances(target);

    (0..m)
        .into_par_iter()
        .flat_map_iter(|i| {
            let ds = &ds;
            let dt = &dt;
            (0..n).flat_map(move |j| {
                (0..m).filter(move |&k| k != i).flat_map(move |k| {
                    let d_src = ds[(i, k)];
                    (0..n).filter_map(move |l| {
                        if l == j {
                            return None;
                        }
                        let d_tgt = dt[(j, l)];
                        let c = (d_src - d_tgt).abs();
                        (c <= epsilon
                            && d_src >= pairwise_dist_threshold
                            && d_tgt >= pairwise_dist_threshold)
                            .then_some(((i, j, k, l), c))
                    })
                })
            })
        })
        .collect()
}

/// Sparse pairwise weights `w(i, j, k, l) = -exp(-consistency)`.
///
/// Only consistent tuples are stored; every other weight is zero.
#[derive(Debug, Clone, Default)]
pub struct WeightTensor {
    weights: HashMap<WeightKey, f64>,
}

impl WeightTensor {
    /// Build the tensor for a source/target pair.
    pub fn generate(
        source: &PointCloud,
        target: &PointCloud,
        epsilon: f64,
        pairwise_dist_threshold: f64,
    ) -> Self {
        let weights = consistent_tuples(source, target, epsilon, pairwise_dist_threshold)
            .into_iter()
            .map(|(key, c)| (key, -(-c).exp()))
            .collect();
        Self { weights }
    }

    pub fn get(&self, key: &WeightKey) -> Option<f64> {
        self.weights.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WeightKey, &f64)> {
        self.weights.iter()
    }
}

impl FromIterator<(WeightKey, f64)> for WeightTensor {
    fn from_iter<I: IntoIterator<Item = (WeightKey, f64)>>(iter: I) -> Self {
        Self {
            weights: iter.into_iter().collect(),
        }
    }
}
