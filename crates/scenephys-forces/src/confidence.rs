//! A correspondence is trusted in proportion to how much of the expected model
//! surface the scene still supports, and that trust decays as the simulated
//! object moves away from the pose the correspondence was computed at.

use glam::DVec3;
use scenephys_3d::{pose::Isometry, voxel_grid::VoxelGrid};

/// Fraction of the expected surface covered by the supported points, in `[0, 1]`.
///
/// Both sets are voxelized at `voxel_size` and the occupied voxels are
/// counted, so the score does not depend on how densely the model was sampled.
/// An empty expected set or an invalid voxel size gives `0.0`.
pub fn coverage_confidence(supported: &[[f64; 3]], expected: &[[f64; 3]], voxel_size: f64) -> f64 {
    let grid = match VoxelGrid::new(voxel_size) {
        Ok(grid) => grid,
        Err(err) => {
            log::debug!("Confidence scoring skipped: {}", err);
            return 0.0;
        }
    };

    let expected_voxels = grid.occupied_voxels(expected);
    if expected_voxels == 0 {
        return 0.0;
    }
    let supported_voxels = grid.occupied_voxels(supported);

    (supported_voxels as f64 / expected_voxels as f64).clamp(0.0, 1.0)
}

/// RMS displacement of the model samples between two poses, in meters.
///
/// Falls back to the translation distance when the model has no samples.
pub fn pose_divergence(model_points: &[[f64; 3]], from: &Isometry, to: &Isometry) -> f64 {
    if model_points.is_empty() {
        return from.translation_distance(to);
    }
    let sum_sq = model_points
        .iter()
        .map(|p| {
            let p = DVec3::from_array(*p);
            from.transform_vec3(p).distance_squared(to.transform_vec3(p))
        })
        .sum::<f64>();
    (sum_sq / model_points.len() as f64).sqrt()
}

/// Multiplier in `(0, 1]` applied to a cached confidence: `exp(-divergence / decay_distance)`.
///
/// Non increasing in `divergence`. A non positive `decay_distance` disables the decay.
pub fn divergence_decay(divergence: f64, decay_distance: f64) -> f64 {
    if !(decay_distance > 0.0) {
        return 1.0;
    }
    if !divergence.is_finite() {
        return 0.0;
    }
    (-divergence.max(0.0) / decay_distance).exp()
}
