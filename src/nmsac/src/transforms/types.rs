//! Rigid transform representation and conversions.

use nalgebra::{
    Isometry3, Matrix3, Matrix3xX, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3,
};
use serde::Serialize;

use crate::point_cloud::PointCloud;

/// A rotation followed by a translation: `x' = R x + t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RigidTransform {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Build from roll/pitch/yaw (rotation `Rz(yaw) * Ry(pitch) * Rx(roll)`).
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64, translation: Vector3<f64>) -> Self {
        Self {
            rotation: Rotation3::from_euler_angles(roll, pitch, yaw).into_inner(),
            translation,
        }
    }

    /// 4x4 homogeneous matrix `[R t; 0 1]`.
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut h = Matrix4::identity();
        h.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        h.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        h
    }

    /// Split a homogeneous matrix into rotation and translation.
    ///
    /// The bottom row is ignored.
    pub fn from_homogeneous(h: &Matrix4<f64>) -> Self {
        Self {
            rotation: h.fixed_view::<3, 3>(0, 0).into_owned(),
            translation: h.fixed_view::<3, 1>(0, 3).into_owned(),
        }
    }

    /// Convert to an isometry; the rotation is re-orthonormalized.
    pub fn to_isometry(&self) -> Isometry3<f64> {
        let rotation = UnitQuaternion::from_matrix(&self.rotation);
        Isometry3::from_parts(Translation3::from(self.translation), rotation)
    }

    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        Self {
            rotation: iso.rotation.to_rotation_matrix().into_inner(),
            translation: iso.translation.vector,
        }
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    pub fn inverse(&self) -> RigidTransform {
        let rt = self.rotation.transpose();
        RigidTransform {
            rotation: rt,
            translation: -(rt * self.translation),
        }
    }

    pub fn apply_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Transform every point of a cloud.
    pub fn apply(&self, cloud: &PointCloud) -> PointCloud {
        let mut points: Matrix3xX<f64> = self.rotation * cloud.as_matrix();
        for mut col in points.column_iter_mut() {
            col += self.translation;
        }
        PointCloud::new(points)
    }
}
