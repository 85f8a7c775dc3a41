use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;
use nalgebra as na;

/// Read-only k-d tree over a point set. Built once, then queried from many
/// rayon workers at the same time.
pub struct SpatialIndex {
    tree: Option<ImmutableKdTree<f64, u32, 3, 32>>,
    len: usize,
}

impl SpatialIndex {
    pub fn new(points: &[[f64; 3]]) -> SpatialIndex {
        SpatialIndex {
            tree: (!points.is_empty()).then(|| ImmutableKdTree::new_from_slice(points)),
            len: points.len(),
        }
    }

    pub fn from_na_points(points: &[na::Vector3<f64>]) -> SpatialIndex {
        let points: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
        SpatialIndex::new(&points)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Index of the closest indexed point and its euclidean distance.
    pub fn get_closest_neighbor(&self, point: &na::Vector3<f64>) -> Option<(usize, f64)> {
        let nn = self
            .tree
            .as_ref()?
            .nearest_one::<SquaredEuclidean>(&[point.x, point.y, point.z]);
        Some((nn.item as usize, nn.distance.sqrt()))
    }
}
