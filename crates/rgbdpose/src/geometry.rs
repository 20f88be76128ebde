//! Rigid transforms and quaternion helpers shared by the camera and pose stages.
//!
//! Quaternions cross the network boundary as `(w, x, y, z)` arrays; inside
//! the crate they are `nalgebra` unit quaternions.

use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Serializable rigid transform `p' = R p + t`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RigidTransform {
    /// Rotation quaternion `(w, x, y, z)`; normalised on use.
    pub rotation_wxyz: [f64; 4],
    /// Translation in meters.
    pub translation: [f64; 3],
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self {
            rotation_wxyz: [1.0, 0.0, 0.0, 0.0],
            translation: [0.0; 3],
        }
    }
}

impl RigidTransform {
    /// Convert to an isometry. Returns `None` for a degenerate quaternion.
    pub fn to_isometry(&self) -> Option<Isometry3<f64>> {
        let rotation = unit_quaternion_from_wxyz(self.rotation_wxyz)?;
        let t = self.translation;
        if !t.iter().all(|v| v.is_finite()) {
            return None;
        }
        Some(Isometry3::from_parts(
            Translation3::new(t[0], t[1], t[2]),
            rotation,
        ))
    }

    /// Build from an isometry.
    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        let q = iso.rotation.quaternion();
        let t = iso.translation.vector;
        Self {
            rotation_wxyz: [q.w, q.i, q.j, q.k],
            translation: [t.x, t.y, t.z],
        }
    }
}

/// Normalise a `(w, x, y, z)` quaternion.
///
/// Returns `None` when the norm is zero or not finite.
pub fn unit_quaternion_from_wxyz(wxyz: [f64; 4]) -> Option<UnitQuaternion<f64>> {
    let q = Quaternion::new(wxyz[0], wxyz[1], wxyz[2], wxyz[3]);
    let norm = q.norm();
    if !norm.is_finite() || norm < 1e-12 {
        return None;
    }
    Some(UnitQuaternion::from_quaternion(q))
}

/// Apply `pose` to every point: `R p + t`.
pub fn transform_points(pose: &Isometry3<f64>, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
    points
        .iter()
        .map(|p| {
            let q = pose * Point3::new(p[0], p[1], p[2]);
            [q.x, q.y, q.z]
        })
        .collect()
}

/// Express camera-frame points in the object frame of `pose`: `R^T (p - t)`.
pub fn to_object_frame(pose: &Isometry3<f64>, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
    let inv = pose.inverse();
    transform_points(&inv, points)
}

/// Build an isometry from a rotation and a translation vector.
pub fn isometry(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Isometry3<f64> {
    Isometry3::from_parts(Translation3::from(translation), rotation)
}
