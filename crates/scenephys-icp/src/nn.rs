use kiddo::immutable::float::kdtree::ImmutableKdTree;
use scenephys_3d::pointcloud::PointCloud;

type KdTree = ImmutableKdTree<f64, u32, 3, 32>;

/// Result of a nearest neighbour query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the neighbour in the indexed cloud.
    pub index: usize,
    /// The neighbour point.
    pub point: [f64; 3],
    /// Euclidean distance from the query to the neighbour.
    pub distance: f64,
}

/// A nearest neighbour index over an observed point cloud.
///
/// The index is immutable: a new observation builds a new index. An empty
/// cloud yields an index that answers every query with `None`.
pub struct SceneIndex {
    points: Vec<[f64; 3]>,
    kdtree: Option<KdTree>,
}

impl SceneIndex {
    /// Build the index over a set of points.
    pub fn new(points: Vec<[f64; 3]>) -> Self {
        let kdtree = (!points.is_empty()).then(|| KdTree::new_from_slice(&points));
        log::debug!("Built scene index over {} points", points.len());
        Self { points, kdtree }
    }

    /// Build the index over a point cloud.
    pub fn from_cloud(cloud: PointCloud) -> Self {
        Self::new(cloud.into_points())
    }

    /// Number of indexed points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the index holds no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The indexed points.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Find the closest indexed point to `query`.
    pub fn nearest(&self, query: &[f64; 3]) -> Option<Neighbor> {
        let kdtree = self.kdtree.as_ref()?;
        let nn = kdtree.nearest_one::<kiddo::SquaredEuclidean>(query);
        let index = nn.item as usize;
        Some(Neighbor {
            index,
            point: self.points[index],
            distance: nn.distance.sqrt(),
        })
    }
}

impl std::fmt::Debug for SceneIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneIndex")
            .field("num_points", &self.points.len())
            .finish()
    }
}
