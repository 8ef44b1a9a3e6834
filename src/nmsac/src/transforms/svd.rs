//! Least-squares rigid fit from point correspondences.
//!
//! Given paired points `(s_i, t_i)`, the rotation minimizing
//! `Σ |R s_i + t - t_i|²` comes from the SVD of the cross-covariance
//! `C = Σ (s_i - c_s)(t_i - c_t)ᵀ = U Σ Vᵀ` as `R = V D Uᵀ`, where
//! `D = diag(1, 1, sign(det(U Vᵀ)))` rules out reflections. The
//! translation then maps the source centroid onto the target centroid.

use nalgebra::{Matrix3, Matrix3xX};

use super::types::RigidTransform;
use crate::correspondences::Correspondences;
use crate::error::FitError;
use crate::point_cloud::PointCloud;

/// Fit the rigid transform mapping `source` onto `target`.
///
/// # Arguments
/// * `source` - Points to be moved
/// * `target` - Points to align to
/// * `correspondences` - Pairs `(source index, target index)`; with `None`
///   column `i` of `source` is paired with column `i` of `target`
///
/// # Errors
/// Identity pairing needs equal point counts, explicit pairs must be in
/// range, and at least one pair is required.
pub fn best_fit_transform(
    source: &PointCloud,
    target: &PointCloud,
    correspondences: Option<&Correspondences>,
) -> Result<RigidTransform, FitError> {
    let (src, tgt) = match correspondences {
        Some(pairs) => paired_columns(source, target, pairs)?,
        None => {
            if source.len() != target.len() {
                return Err(FitError::CountMismatch {
                    source_len: source.len(),
                    target_len: target.len(),
                });
            }
            (source.as_matrix().clone(), target.as_matrix().clone())
        }
    };
    if src.ncols() == 0 {
        return Err(FitError::Empty);
    }

    let n = src.ncols() as f64;
    let src_centroid = src.column_sum() / n;
    let tgt_centroid = tgt.column_sum() / n;

    let mut covariance = Matrix3::zeros();
    for (s, t) in src.column_iter().zip(tgt.column_iter()) {
        covariance += (s - src_centroid) * (t - tgt_centroid).transpose();
    }

    let svd = covariance.svd(true, true);
    // Both factors were requested, so they are always present.
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(FitError::Empty);
    };
    let v = v_t.transpose();

    let mut correction = Matrix3::identity();
    if (u * v_t).determinant() < 0.0 {
        correction[(2, 2)] = -1.0;
    }

    let rotation = v * correction * u.transpose();
    let translation = tgt_centroid - rotation * src_centroid;
    Ok(RigidTransform::new(rotation, translation))
}

fn paired_columns(
    source: &PointCloud,
    target: &PointCloud,
    pairs: &Correspondences,
) -> Result<(Matrix3xX<f64>, Matrix3xX<f64>), FitError> {
    let mut src_idx = Vec::with_capacity(pairs.len());
    let mut tgt_idx = Vec::with_capacity(pairs.len());
    for &(s, t) in pairs.keys() {
        if s >= source.len() || t >= target.len() {
            return Err(FitError::IndexOutOfRange {
                source_index: s,
                target_index: t,
            });
        }
        src_idx.push(s);
        tgt_idx.push(t);
    }
    Ok((
        source.as_matrix().select_columns(&src_idx),
        target.as_matrix().select_columns(&tgt_idx),
    ))
}
