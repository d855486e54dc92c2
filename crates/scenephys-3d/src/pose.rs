use glam::{DMat3, DMat4, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// A rigid transformation in 3D: a rotation followed by a translation.
///
/// Poses map points from an object frame into the world (scene) frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Isometry {
    /// Rotation as a unit quaternion.
    pub rotation: DQuat,
    /// Translation in meters.
    pub translation: DVec3,
}

impl Default for Isometry {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Isometry {
    /// The identity transformation.
    pub const IDENTITY: Self = Self {
        rotation: DQuat::IDENTITY,
        translation: DVec3::ZERO,
    };

    /// Create a pose from a rotation and a translation.
    pub fn new(rotation: DQuat, translation: DVec3) -> Self {
        Self {
            rotation: rotation.normalize(),
            translation,
        }
    }

    /// Create a pure translation.
    pub fn from_translation(translation: DVec3) -> Self {
        Self {
            rotation: DQuat::IDENTITY,
            translation,
        }
    }

    /// Create a pose from an axis, an angle in radians and a translation.
    pub fn from_axis_angle(axis: DVec3, angle: f64, translation: DVec3) -> Self {
        let rotation = DQuat::from_axis_angle(axis.normalize(), angle);
        Self {
            rotation,
            translation,
        }
    }

    /// Create a pose from a row major rotation matrix and a translation vector.
    pub fn from_rotation_matrix(rotation: &[[f64; 3]; 3], translation: &[f64; 3]) -> Self {
        // glam matrices are column major
        let mat = DMat3::from_cols(
            DVec3::new(rotation[0][0], rotation[1][0], rotation[2][0]),
            DVec3::new(rotation[0][1], rotation[1][1], rotation[2][1]),
            DVec3::new(rotation[0][2], rotation[1][2], rotation[2][2]),
        );
        Self::new(DQuat::from_mat3(&mat), DVec3::from_array(*translation))
    }

    /// The inverse transformation.
    pub fn inverse(&self) -> Self {
        let inv_rot = self.rotation.inverse();
        let inv_trans = -(inv_rot * self.translation);
        Self {
            rotation: inv_rot,
            translation: inv_trans,
        }
    }

    /// Compose two poses as `self * other`, so `other` is applied first.
    pub fn compose(&self, other: &Isometry) -> Self {
        let new_rotation = (self.rotation * other.rotation).normalize();
        let new_translation = self.translation + (self.rotation * other.translation);
        Self {
            rotation: new_rotation,
            translation: new_translation,
        }
    }

    /// Homogeneous 4x4 matrix of the transformation.
    pub fn as_matrix(&self) -> DMat4 {
        DMat4::from_rotation_translation(self.rotation, self.translation)
    }

    /// Transform a single point.
    #[inline]
    pub fn transform_point(&self, point: &[f64; 3]) -> [f64; 3] {
        (self.rotation * DVec3::from_array(*point) + self.translation).to_array()
    }

    /// Transform a single point given as a glam vector.
    #[inline]
    pub fn transform_vec3(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    /// Transform a set of points.
    pub fn transform_points(&self, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        points.iter().map(|p| self.transform_point(p)).collect()
    }

    /// Euclidean distance between the translations of two poses.
    pub fn translation_distance(&self, other: &Isometry) -> f64 {
        self.translation.distance(other.translation)
    }

    /// Smallest rotation angle in radians taking one orientation to the other.
    pub fn rotation_angle(&self, other: &Isometry) -> f64 {
        self.rotation.angle_between(other.rotation)
    }

    /// Check that every component is finite.
    pub fn is_finite(&self) -> bool {
        self.rotation.is_finite() && self.translation.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity() {
        let pose = Isometry::default();
        assert_eq!(pose.transform_point(&[1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let pose =
            Isometry::from_axis_angle(DVec3::new(1.0, 1.0, 0.0), 0.7, DVec3::new(0.1, -0.2, 0.3));
        let point = [0.3, 0.5, -0.1];
        let back = pose.inverse().transform_point(&pose.transform_point(&point));
        for i in 0..3 {
            assert_relative_eq!(back[i], point[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_compose_order() {
        let rot = Isometry::from_axis_angle(DVec3::Z, std::f64::consts::FRAC_PI_2, DVec3::ZERO);
        let shift = Isometry::from_translation(DVec3::X);
        // shift first, then rotate
        let composed = rot.compose(&shift);
        let p = composed.transform_point(&[0.0, 0.0, 0.0]);
        assert_relative_eq!(p[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_from_rotation_matrix() {
        // 90 degrees around x
        let rotation = [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]];
        let pose = Isometry::from_rotation_matrix(&rotation, &[0.0, 0.0, 1.0]);
        let p = pose.transform_point(&[0.0, 1.0, 0.0]);
        assert_relative_eq!(p[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(p[2], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_distances() {
        let a = Isometry::IDENTITY;
        let b = Isometry::from_axis_angle(DVec3::Y, 0.25, DVec3::new(3.0, 4.0, 0.0));
        assert_relative_eq!(a.translation_distance(&b), 5.0, epsilon = 1e-12);
        assert_relative_eq!(a.rotation_angle(&b), 0.25, epsilon = 1e-9);
    }
}
