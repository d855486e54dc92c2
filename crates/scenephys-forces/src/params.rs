use scenephys_icp::ICPConvergenceCriteria;
use serde::{Deserialize, Serialize};

use crate::ForceError;

/// Tunables shared by every force computation.
///
/// Set once before a simulation run; read by every force query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceParameters {
    /// Force per correspondence pair per meter of displacement, in N/m.
    pub forces_magnitude_per_point: f64,
    /// Pairs farther apart than this, in meters, are treated as outliers.
    pub max_point_distance_threshold: f64,
    /// Maximum number of ICP iterations per registration.
    pub max_icp_iteration: usize,
    /// ICP stops once the RMSE changes by less than this between iterations.
    pub icp_tolerance: f64,
    /// Cap on the net data force as a fraction of the body weight. Disabled when `<= 0`.
    pub percent_gravity_max_correction: f64,
    /// Voxel edge length in meters used for confidence scoring.
    pub confidence_voxel_size: f64,
    /// Pose divergence in meters at which a cached confidence has decayed to `1/e`.
    /// Disabled when `<= 0`.
    pub confidence_decay_distance: f64,
    /// Margin in meters added around the posed model when cropping the scene for ICP.
    pub icp_crop_margin: f64,
}

impl Default for ForceParameters {
    fn default() -> Self {
        Self {
            forces_magnitude_per_point: 0.5,
            max_point_distance_threshold: 0.01,
            max_icp_iteration: 25,
            icp_tolerance: 1e-6,
            percent_gravity_max_correction: 0.5,
            confidence_voxel_size: 0.003,
            confidence_decay_distance: 0.02,
            icp_crop_margin: 0.05,
        }
    }
}

impl ForceParameters {
    /// Check every parameter is in range.
    pub fn validate(&self) -> Result<(), ForceError> {
        let checks = [
            (
                "forces_magnitude_per_point",
                self.forces_magnitude_per_point,
                self.forces_magnitude_per_point >= 0.0,
            ),
            (
                "max_point_distance_threshold",
                self.max_point_distance_threshold,
                self.max_point_distance_threshold > 0.0,
            ),
            (
                "icp_tolerance",
                self.icp_tolerance,
                self.icp_tolerance >= 0.0,
            ),
            (
                "confidence_voxel_size",
                self.confidence_voxel_size,
                self.confidence_voxel_size > 0.0,
            ),
            (
                "icp_crop_margin",
                self.icp_crop_margin,
                self.icp_crop_margin >= 0.0,
            ),
        ];
        for (name, value, ok) in checks {
            if !ok || !value.is_finite() {
                return Err(ForceError::InvalidParameter { name, value });
            }
        }
        Ok(())
    }

    pub(crate) fn icp_criteria(&self) -> ICPConvergenceCriteria {
        ICPConvergenceCriteria {
            max_iterations: self.max_icp_iteration,
            tolerance: self.icp_tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ForceParameters::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let params = ForceParameters {
            max_point_distance_threshold: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ForceError::InvalidParameter {
                name: "max_point_distance_threshold",
                ..
            })
        ));

        let params = ForceParameters {
            forces_magnitude_per_point: f64::NAN,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
