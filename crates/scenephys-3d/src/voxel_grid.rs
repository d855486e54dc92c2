use std::collections::HashMap;

use glam::DVec3;

use crate::pointcloud::PointCloud;

/// Error types for the voxel grid.
#[derive(Debug, thiserror::Error)]
pub enum VoxelGridError {
    /// The leaf size must be strictly positive and finite.
    #[error("Leaf size must be positive and finite. Got: {0}")]
    InvalidLeafSize(f64),
}

/// A cubic voxel grid used to downsample point clouds and to measure how much
/// of space a set of points covers.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    /// The edge length of a voxel.
    leaf_size: f64,
    /// Minimum number of points required per voxel.
    min_points_per_voxel: usize,
}

impl VoxelGrid {
    /// Creates a new `VoxelGrid` with the specified leaf size.
    ///
    /// # Arguments
    /// * `leaf_size` - The edge length of a voxel in meters.
    ///
    /// # Errors
    /// Returns [`VoxelGridError::InvalidLeafSize`] if `leaf_size` is not positive.
    pub fn new(leaf_size: f64) -> Result<Self, VoxelGridError> {
        if !(leaf_size > 0.0 && leaf_size.is_finite()) {
            return Err(VoxelGridError::InvalidLeafSize(leaf_size));
        }
        Ok(Self {
            leaf_size,
            min_points_per_voxel: 1,
        })
    }

    /// Sets the minimum number of points a voxel needs to be kept.
    pub fn with_min_points_per_voxel(mut self, min_points: usize) -> Self {
        self.min_points_per_voxel = min_points;
        self
    }

    /// The edge length of a voxel.
    pub fn leaf_size(&self) -> f64 {
        self.leaf_size
    }

    /// Computes the voxel index for a given point.
    #[inline]
    pub fn voxel_index(&self, point: &[f64; 3]) -> (i64, i64, i64) {
        (
            (point[0] / self.leaf_size).floor() as i64,
            (point[1] / self.leaf_size).floor() as i64,
            (point[2] / self.leaf_size).floor() as i64,
        )
    }

    fn accumulate(&self, points: &[[f64; 3]]) -> HashMap<(i64, i64, i64), (DVec3, usize)> {
        let mut grid: HashMap<(i64, i64, i64), (DVec3, usize)> = HashMap::new();
        for point in points.iter().filter(|p| p.iter().all(|v| v.is_finite())) {
            let entry = grid
                .entry(self.voxel_index(point))
                .or_insert((DVec3::ZERO, 0));
            entry.0 += DVec3::from_array(*point);
            entry.1 += 1;
        }
        grid
    }

    /// Downsamples the points by replacing the points of every voxel with their centroid.
    ///
    /// Non finite points are ignored.
    pub fn downsample_points(&self, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        self.accumulate(points)
            .into_values()
            .filter(|(_, count)| *count >= self.min_points_per_voxel)
            .map(|(sum, count)| (sum / count as f64).to_array())
            .collect()
    }

    /// Downsamples a point cloud.
    pub fn downsample(&self, point_cloud: &PointCloud) -> PointCloud {
        PointCloud::new(self.downsample_points(point_cloud.points()))
    }

    /// Number of voxels holding at least `min_points_per_voxel` points.
    pub fn occupied_voxels(&self, points: &[[f64; 3]]) -> usize {
        self.accumulate(points)
            .values()
            .filter(|(_, count)| *count >= self.min_points_per_voxel)
            .count()
    }
}
