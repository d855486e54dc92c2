use glam::DVec3;

use crate::pose::Isometry;

/// A point cloud holding 3D points in meters.
///
/// Scene observations and model surface samples share this type. A cloud is
/// immutable once built; a new observation replaces the cloud wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
}

impl PointCloud {
    /// Create a new point cloud from a list of points.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        Self { points }
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Consume the cloud and return the points.
    pub fn into_points(self) -> Vec<[f64; 3]> {
        self.points
    }

    /// Return a copy of the cloud with every point mapped through `pose`.
    pub fn transformed(&self, pose: &Isometry) -> PointCloud {
        PointCloud::new(pose.transform_points(&self.points))
    }

    /// Mean of all points, `None` for an empty cloud.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p));
        Some((sum / self.points.len() as f64).to_array())
    }

    /// Axis aligned bounds of the cloud, `None` for an empty cloud.
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.points)
    }
}

impl From<Vec<[f64; 3]>> for PointCloud {
    fn from(points: Vec<[f64; 3]>) -> Self {
        Self::new(points)
    }
}

/// An axis aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner.
    pub min: [f64; 3],
    /// Maximum corner.
    pub max: [f64; 3],
}

impl BoundingBox {
    /// Compute the tightest box around `points`, `None` when there are no points.
    pub fn from_points(points: &[[f64; 3]]) -> Option<Self> {
        let first = DVec3::from_array(*points.first()?);
        let (min, max) = points.iter().fold((first, first), |(lo, hi), p| {
            let p = DVec3::from_array(*p);
            (lo.min(p), hi.max(p))
        });
        Some(Self {
            min: min.to_array(),
            max: max.to_array(),
        })
    }

    /// Grow the box by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min: (DVec3::from_array(self.min) - DVec3::splat(margin)).to_array(),
            max: (DVec3::from_array(self.max) + DVec3::splat(margin)).to_array(),
        }
    }

    /// Check whether `point` lies inside the box, bounds included.
    #[inline]
    pub fn contains(&self, point: &[f64; 3]) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }

    /// Keep the points inside the box.
    pub fn crop(&self, points: &[[f64; 3]]) -> Vec<[f64; 3]> {
        points
            .iter()
            .filter(|p| self.contains(p))
            .copied()
            .collect()
    }
}
